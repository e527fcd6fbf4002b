//! Ordered backend registry.
//!
//! The [`BackendRegistry`] keeps backends sorted by priority (Specialized
//! first, Fallback last; registration order within a level) and hands out
//! the first one that accepts a URL.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::{ClientOptions, GDriveBackend, HttpBackend, MegaBackend, TransferBackend, TransferError};

/// Raised when no registered backend accepts a URL.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// Every backend refused the URL.
    #[error("no backend accepts download URL '{url}'")]
    NoBackend {
        /// The rejected URL.
        url: String,
    },
}

/// A priority-ordered collection of transfer backends.
///
/// Selection has no state and is safe to call from many tasks at once.
pub struct BackendRegistry {
    backends: Vec<Arc<dyn TransferBackend>>,
}

impl BackendRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    /// Registers a backend, keeping the list ordered by priority.
    ///
    /// A backend goes after every already registered backend of the same or
    /// higher priority, so a Fallback backend can never shadow a Specialized one.
    #[tracing::instrument(skip(self, backend), fields(backend_name = backend.name()))]
    pub fn register(&mut self, backend: Arc<dyn TransferBackend>) {
        debug!(
            name = backend.name(),
            priority = ?backend.priority(),
            "Registering backend"
        );
        let position = self
            .backends
            .iter()
            .position(|existing| existing.priority() > backend.priority())
            .unwrap_or(self.backends.len());
        self.backends.insert(position, backend);
    }

    /// Backend names in selection order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Returns the first backend, in order, that accepts `url`.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::NoBackend`] when every backend refuses.
    pub fn select(&self, url: &str) -> Result<Arc<dyn TransferBackend>, SelectionError> {
        let trimmed = url.trim();
        self.backends
            .iter()
            .find(|backend| !trimmed.is_empty() && backend.accepts(trimmed))
            .map(|backend| {
                debug!(backend = backend.name(), url = %trimmed, "backend selected");
                Arc::clone(backend)
            })
            .ok_or_else(|| SelectionError::NoBackend {
                url: url.to_string(),
            })
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}

/// Builds the registry used by the CLI: Google Drive, MEGA, then HTTP.
///
/// # Errors
///
/// Returns [`TransferError::Client`] if an HTTP client cannot be built.
pub fn build_default_registry(options: &ClientOptions) -> Result<BackendRegistry, TransferError> {
    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(GDriveBackend::new(options)?));
    registry.register(Arc::new(MegaBackend::new()));
    registry.register(Arc::new(HttpBackend::new(options)?));
    Ok(registry)
}
