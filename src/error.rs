use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum RelayError {
    Config(String),
    InvalidPath { path: PathBuf, reason: String },
    DuplicateName(String),
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Predictor(String),
}

impl RelayError {
    pub fn invalid_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        RelayError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Config(e) => write!(f, "Configuration error: {}", e),
            RelayError::InvalidPath { path, reason } => {
                write!(f, "Invalid path {}: {}", path.display(), reason)
            }
            RelayError::DuplicateName(e) => write!(f, "Duplicate canonical name: {}", e),
            RelayError::Io(e) => write!(f, "IO error: {}", e),
            RelayError::Serialization(e) => write!(f, "Manifest serialization error: {}", e),
            RelayError::Predictor(e) => write!(f, "Predictor error: {}", e),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelayError::Io(e) => Some(e),
            RelayError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Io(err)
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Serialization(err)
    }
}
