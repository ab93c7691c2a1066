use std::path::PathBuf;
use thiserror::Error;

use handson_backend::BackendError;

#[derive(Error, Debug)]
pub enum LabError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{}:{line}: {message}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("Verification failed: {0}")]
    Verification(String),
}

impl LabError {
    pub(crate) fn parse(path: &std::path::Path, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            line,
            message: message.into(),
        }
    }
}

pub type LabResult<T> = Result<T, LabError>;
