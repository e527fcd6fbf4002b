//! Error types for the per-entry download pipeline.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{SelectionError, TransferError};
use crate::catalog::{CatalogError, ModelType};

/// Failures that end the pipeline for one entry.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No backend accepts the download URL.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// The backend failed to probe or transfer.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Writing results back to the catalog failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Local file system error (directories, temp file, publish, hashing).
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the failing operation.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Neither an override nor a default directory exists for the type.
    #[error("destination path is undefined for model type '{model_type}'")]
    DestinationUndefined {
        /// Type of the entry.
        model_type: ModelType,
    },

    /// The subdirectory would escape the destination directory.
    #[error("subdirectory '{subdir}' must be a relative path without '..'")]
    UnsafeSubdirectory {
        /// The rejected value.
        subdir: String,
    },
}

impl PipelineError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short variant name used in captured errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Selection(_) => "NoBackendError",
            Self::Transfer(inner) => inner.kind(),
            Self::Catalog(_) => "CatalogError",
            Self::Io { .. } => "IoError",
            Self::DestinationUndefined { .. } => "DestinationUndefinedError",
            Self::UnsafeSubdirectory { .. } => "UnsafeSubdirectoryError",
        }
    }
}

/// Displayable error captured into batch state: `"<kind>: <message>"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error type name.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorInfo {
    /// Creates an error record.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<&PipelineError> for ErrorInfo {
    fn from(error: &PipelineError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}
