//! Error types for catalog operations.

use thiserror::Error;

/// Errors raised by a catalog store.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No record with the given id.
    #[error("catalog record not found: {0}")]
    NotFound(i64),

    /// The entry has no identifier, so it cannot be updated.
    #[error("catalog entry '{name}' has no identifier")]
    MissingId {
        /// Display name of the offending entry.
        name: String,
    },

    /// A stored or requested model type label is not recognised.
    #[error("there is no model type named '{0}'")]
    InvalidModelType(String),
}
