//! Filename grammar of the external predictor.
//!
//! Everything that knows how nnU-Net spells its file names lives here: the
//! `_0000` channel suffix on inputs, the bare `<case_id><ending>` outputs and
//! the set of multi-part image endings such as `.nii.gz`. Swapping the
//! model-serving backend means swapping this value, nothing else.

/// Image endings nnU-Net's default readers accept.
pub const DEFAULT_IMAGE_ENDINGS: &[&str] = &[
    ".nii.gz", ".nii", ".nrrd", ".mha", ".gipl", ".tif", ".tiff", ".png", ".bmp",
];

/// Endings of the probability exports written next to segmentations.
pub const DEFAULT_AUXILIARY_ENDINGS: &[&str] = &[".npz", ".pkl"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Segmentation,
    Auxiliary,
}

/// A file name the predictor produced, broken into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputName {
    pub case_id: String,
    pub ending: String,
    pub kind: OutputKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingConvention {
    channel: u32,
    channel_digits: usize,
    id_width: usize,
    image_endings: Vec<String>,
    input_endings: Vec<String>,
    auxiliary_endings: Vec<String>,
}

impl Default for NamingConvention {
    fn default() -> Self {
        Self::nnunet()
    }
}

impl NamingConvention {
    /// nnU-Net v2: single channel `_0000`, four digit case ids.
    pub fn nnunet() -> Self {
        Self {
            channel: 0,
            channel_digits: 4,
            id_width: 4,
            image_endings: to_strings(DEFAULT_IMAGE_ENDINGS),
            input_endings: to_strings(DEFAULT_IMAGE_ENDINGS),
            auxiliary_endings: to_strings(DEFAULT_AUXILIARY_ENDINGS),
        }
    }

    /// Only map inputs with these endings, e.g. the dataset's `file_ending`.
    /// Outputs are still recognised with any known image ending.
    pub fn with_input_endings<I, S>(mut self, endings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.input_endings = endings.into_iter().map(|e| normalize_ending(e.as_ref())).collect();
        for ending in &self.input_endings {
            if !self.image_endings.contains(ending) {
                self.image_endings.push(ending.clone());
            }
        }
        self
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    pub fn image_endings(&self) -> &[String] {
        &self.image_endings
    }

    pub fn input_endings(&self) -> &[String] {
        &self.input_endings
    }

    pub fn auxiliary_endings(&self) -> &[String] {
        &self.auxiliary_endings
    }

    pub fn channel_suffix(&self) -> String {
        format!("_{:0width$}", self.channel, width = self.channel_digits)
    }

    pub fn case_id(&self, sequence: usize) -> String {
        format!("{:0width$}", sequence, width = self.id_width)
    }

    pub fn canonical_input_name(&self, case_id: &str, ending: &str) -> String {
        format!("{}{}{}", case_id, self.channel_suffix(), ending)
    }

    pub fn output_name(&self, case_id: &str, ending: &str) -> String {
        format!("{}{}", case_id, ending)
    }

    /// Split `name` into stem and image ending. The longest matching ending
    /// wins so `scan.v2.nii.gz` yields `scan.v2` and `.nii.gz`. Matching is
    /// ASCII case-insensitive; the returned ending is the normalised form.
    pub fn split_ending<'a>(&'a self, name: &'a str) -> Option<(&'a str, &'a str)> {
        longest_ending(name, self.image_endings.iter())
    }

    /// `ending` as returned by `split_ending`.
    pub fn accepts_input_ending(&self, ending: &str) -> bool {
        self.input_endings.iter().any(|e| e == ending)
    }

    /// Restored name of a probability export. Keeps the whole original name
    /// so `scan.nii` and `scan.nii.gz` never share one.
    pub fn auxiliary_name(&self, original_name: &str, ending: &str) -> String {
        format!("{}{}", original_name, ending)
    }

    /// Parse `<case_id><channel suffix><ending>` as written into the working folder.
    pub fn parse_canonical_input(&self, name: &str) -> Option<(String, String)> {
        let (stem, ending) = self.split_ending(name)?;
        let case_id = stem.strip_suffix(self.channel_suffix().as_str())?;
        if !is_case_id(case_id) {
            return None;
        }
        Some((case_id.to_string(), ending.to_string()))
    }

    /// Parse a predictor output name: `<case_id>` followed by an image or
    /// auxiliary ending.
    pub fn parse_output(&self, name: &str) -> Option<OutputName> {
        let all = self.image_endings.iter().chain(self.auxiliary_endings.iter());
        let (stem, ending) = longest_ending(name, all)?;
        if !is_case_id(stem) {
            return None;
        }
        let kind = if self.auxiliary_endings.iter().any(|e| e == ending) {
            OutputKind::Auxiliary
        } else {
            OutputKind::Segmentation
        };
        Some(OutputName {
            case_id: stem.to_string(),
            ending: ending.to_string(),
            kind,
        })
    }
}

fn to_strings(endings: &[&str]) -> Vec<String> {
    endings.iter().map(|e| e.to_string()).collect()
}

fn normalize_ending(ending: &str) -> String {
    let lower = ending.to_ascii_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{}", lower)
    }
}

fn is_case_id(stem: &str) -> bool {
    !stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit())
}

fn longest_ending<'a, 'e, I>(name: &'a str, endings: I) -> Option<(&'a str, &'e str)>
where
    I: Iterator<Item = &'e String>,
{
    endings
        .filter(|ending| {
            name.len() > ending.len()
                && name.as_bytes()[name.len() - ending.len()..]
                    .eq_ignore_ascii_case(ending.as_bytes())
        })
        .max_by_key(|ending| ending.len())
        // The matched tail is ASCII, so the split lands on a char boundary.
        .map(|ending| (&name[..name.len() - ending.len()], ending.as_str()))
}
