use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvError {
    #[error("{} not found", .0.display())]
    NotFound(PathBuf),

    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),

    #[error("io error on {}: {reason}", .path.display())]
    Io { path: PathBuf, reason: String },
}

impl EnvError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EnvError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, EnvError::AlreadyExists(_))
    }

    pub(crate) fn io(path: &Path, reason: impl Into<String>) -> Self {
        EnvError::Io {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}
