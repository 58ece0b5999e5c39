//! Error taxonomy for artifact loading and inference.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// A required artifact is missing or unusable. Fatal at startup.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("missing {label} file: {}", path.display())]
    Missing { label: String, path: PathBuf },

    #[error("failed to read {label} file {}: {source}", path.display())]
    Io {
        label: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {label} file {}: {source}", path.display())]
    Malformed {
        label: String,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {label}: {reason}")]
    Invalid { label: String, reason: String },
}

impl ArtifactError {
    pub fn invalid(label: impl Into<String>, reason: impl Into<String>) -> Self {
        ArtifactError::Invalid {
            label: label.into(),
            reason: reason.into(),
        }
    }
}

/// A categorical field holds a value outside its encoder's known domain.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Unknown value for '{field}': '{value}'. Expected one of: {known:?}")]
pub struct UnknownCategoryError {
    pub field: String,
    pub value: String,
    pub known: Vec<String>,
}

/// Failure raised by a model's `predict`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("model '{model}' expects {expected} features, got {actual}")]
    ShapeMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },

    #[error("model '{model}' produced a non-finite output")]
    NonFinite { model: String },

    #[error("model '{model}' failed: {reason}")]
    Failed { model: String, reason: String },
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error(transparent)]
    UnknownCategory(#[from] UnknownCategoryError),

    /// Details are logged under `reference`; callers only see the reference.
    #[error("internal inference failure (reference {reference})")]
    Internal { reference: Uuid },
}

impl InferenceError {
    /// True when the caller supplied bad input (400); false for server faults (500).
    pub fn is_client_error(&self) -> bool {
        matches!(self, InferenceError::UnknownCategory(_))
    }
}
