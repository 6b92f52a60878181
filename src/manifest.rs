use crate::RelayError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// File name of the persisted manifest inside the working directory.
pub const MANIFEST_FILE_NAME: &str = "renaming.json";

/// One logical input tracked through renaming and restoration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Case {
    pub original_name: String,
    pub canonical_name: String,
    pub case_id: String,
    pub channel_index: u32,
    pub ending: String,
}

/// canonical name -> original name, the direction written to disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForwardManifest {
    entries: BTreeMap<String, String>,
}

impl ForwardManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, canonical_name: &str, original_name: &str) -> Result<(), RelayError> {
        if let Some(existing) = self.entries.get(canonical_name) {
            return Err(RelayError::DuplicateName(format!(
                "{} already assigned to {}, refusing to reassign it to {}",
                canonical_name, existing, original_name
            )));
        }
        self.entries
            .insert(canonical_name.to_string(), original_name.to_string());
        Ok(())
    }

    pub fn get(&self, canonical_name: &str) -> Option<&str> {
        self.entries.get(canonical_name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write as pretty JSON with four space indentation, overwriting `path`.
    pub fn persist(&self, path: &Path) -> Result<(), RelayError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        buf.push(b'\n');
        fs::write(path, buf)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, RelayError> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}

/// case id -> case. Keyed by the part of the name the predictor keeps, so an
/// output can be looked up whatever ending it was written with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InverseManifest {
    cases: BTreeMap<String, Case>,
}

impl InverseManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, case: Case) -> Result<(), RelayError> {
        if let Some(existing) = self.cases.get(&case.case_id) {
            return Err(RelayError::DuplicateName(format!(
                "case id {} already assigned to {}, refusing to reassign it to {}",
                case.case_id, existing.original_name, case.original_name
            )));
        }
        self.cases.insert(case.case_id.clone(), case);
        Ok(())
    }

    pub fn get(&self, case_id: &str) -> Option<&Case> {
        self.cases.get(case_id)
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn cases(&self) -> impl Iterator<Item = &Case> {
        self.cases.values()
    }
}

/// Build both directions from an ordered list of cases.
pub fn build_manifests(cases: &[Case]) -> Result<(ForwardManifest, InverseManifest), RelayError> {
    let mut forward = ForwardManifest::new();
    let mut inverse = InverseManifest::new();
    for case in cases {
        forward.insert(&case.canonical_name, &case.original_name)?;
        inverse.insert(case.clone())?;
    }
    Ok((forward, inverse))
}
