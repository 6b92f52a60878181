use crate::file_handler::list_file_names;
use crate::manifest::{build_manifests, Case, ForwardManifest, InverseManifest};
use crate::naming::NamingConvention;
use crate::RelayError;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Assign canonical names to every qualifying file in `source`, in
/// lexicographic order of the original names. Touches nothing on disk.
pub fn plan_cases(
    source: &Path,
    convention: &NamingConvention,
) -> Result<Vec<Case>, RelayError> {
    if !source.is_dir() {
        return Err(RelayError::invalid_path(
            source,
            "input folder does not exist or is not a directory",
        ));
    }

    let mut cases = Vec::new();
    for name in list_file_names(source)? {
        let Some((_, ending)) = convention.split_ending(&name) else {
            debug!(file = %name, "skipping file without a known image ending");
            continue;
        };
        if name.starts_with('.') {
            debug!(file = %name, "skipping hidden file");
            continue;
        }
        if !convention.accepts_input_ending(ending) {
            warn!(
                file = %name,
                accepted = ?convention.input_endings(),
                "skipping image the model does not read, see --file-ending"
            );
            continue;
        }
        let case_id = convention.case_id(cases.len());
        cases.push(Case {
            canonical_name: convention.canonical_input_name(&case_id, ending),
            original_name: name.clone(),
            case_id,
            channel_index: convention.channel(),
            ending: ending.to_string(),
        });
    }
    Ok(cases)
}

/// Copy each case's bytes into `working` under its canonical name.
/// A failed copy aborts; files already copied are left for inspection.
pub fn copy_cases(source: &Path, working: &Path, cases: &[Case]) -> Result<(), RelayError> {
    for case in cases {
        let from = source.join(&case.original_name);
        let to = working.join(&case.canonical_name);
        if to.exists() {
            return Err(RelayError::DuplicateName(format!(
                "{} already present in {}",
                case.canonical_name,
                working.display()
            )));
        }
        fs::copy(&from, &to).map_err(|e| {
            RelayError::Io(io::Error::new(
                e.kind(),
                format!("copy {} -> {}: {}", from.display(), to.display(), e),
            ))
        })?;
        debug!(original = %case.original_name, canonical = %case.canonical_name, "copied");
    }
    Ok(())
}

/// Plan, check the bijection, then copy.
#[instrument(skip_all, fields(source = %source.display(), working = %working.display()))]
pub fn map_and_copy(
    source: &Path,
    working: &Path,
    convention: &NamingConvention,
) -> Result<(ForwardManifest, InverseManifest), RelayError> {
    let cases = plan_cases(source, convention)?;
    let manifests = build_manifests(&cases)?;
    copy_cases(source, working, &cases)?;
    info!(cases = cases.len(), "inputs copied under canonical names");
    Ok(manifests)
}
