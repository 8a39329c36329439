//! Error types for the pca3d command line.

use std::path::PathBuf;
use thiserror::Error;

use pca3d_core::VisError;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    /// Failure inside the pipeline
    #[error(transparent)]
    Core(#[from] VisError),

    /// The input bundle is readable but unusable
    #[error("Invalid input {}: {reason}", .path.display())]
    Input { path: PathBuf, reason: String },

    /// The video encoder cannot be started
    #[error("Encoder unavailable ({binary}): {reason}")]
    Encoder { binary: String, reason: String },
}

impl CliError {
    pub fn input(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Input {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Core(VisError::Io(err))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Core(VisError::Serialization(err))
    }
}
