//! Error types for the pca3d pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VisError>;

/// Errors that can occur while building trajectories or producing animations.
///
/// Validation errors are never retried: they abort the run and carry the
/// offending field together with the expected and actual shape.
#[derive(Debug, Error)]
pub enum VisError {
    /// Array rank, dimension or element type mismatch at a validation boundary
    #[error("Shape mismatch in {field}: expected {expected}, got {actual}")]
    ShapeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// Requested component count is zero or exceeds the available features
    #[error("Cannot compute {requested} principal components from {available} features")]
    Dimension { requested: usize, available: usize },

    /// Target output directory already exists
    #[error("Output directory already exists: {}", .0.display())]
    OutputExists(PathBuf),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A matrix decomposition did not produce the requested factors
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// Timeline builder misuse (unbalanced stack, invalid durations)
    #[error("Timeline error: {0}")]
    Timeline(String),

    /// Frame rasterization failed
    #[error("Render error: {0}")]
    Render(String),

    /// Frame sink / video encoder failed
    #[error("Encode error: {0}")]
    Encode(String),
}

impl VisError {
    /// Creates a shape mismatch error.
    pub fn shape(
        field: impl Into<String>,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        Self::ShapeMismatch {
            field: field.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Creates a timeline error.
    pub fn timeline(msg: impl Into<String>) -> Self {
        Self::Timeline(msg.into())
    }

    /// Returns the offending field name for shape mismatches.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::ShapeMismatch { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl From<image::ImageError> for VisError {
    fn from(err: image::ImageError) -> Self {
        Self::Render(err.to_string())
    }
}
