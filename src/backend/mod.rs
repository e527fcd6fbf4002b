//! Pluggable transfer backends and the ordered registry that selects them.
//!
//! # Architecture
//!
//! - [`TransferBackend`] - Async trait every remote source implements
//! - [`BackendRegistry`] - Priority-ordered backends; first acceptor wins
//! - [`HttpBackend`] - Generic HTTP(S) catch-all, always ordered last
//! - [`GDriveBackend`] - Google Drive share links
//! - [`MegaBackend`] - MEGA share links (recognised, not implemented)
//!
//! Backends write into the path they are given and report progress over a
//! bounded channel; they never choose destinations or touch the catalog.

mod client;
mod constants;
mod error;
mod gdrive;
mod http;
mod mega;
mod progress;
mod registry;

pub use client::ClientOptions;
pub use constants::{CONNECT_TIMEOUT_SECS, PROBE_TIMEOUT_SECS, READ_TIMEOUT_SECS};
pub use error::TransferError;
pub use gdrive::GDriveBackend;
pub use http::HttpBackend;
pub use mega::MegaBackend;
pub use progress::{
    PROGRESS_CHANNEL_CAPACITY, ProgressMeter, ProgressReceiver, ProgressSender, TransferProgress,
    progress_channel,
};
pub use registry::{BackendRegistry, SelectionError, build_default_registry};

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Priority level for backend ordering.
///
/// Derives `Ord` so that `Specialized < Fallback`; specialized backends get
/// first refusal. Within a level, registration order is preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BackendPriority {
    /// Link-specific backends (share-link services).
    Specialized = 0,
    /// Generic catch-all.
    Fallback = 1,
}

/// Arguments for one [`TransferBackend::transfer`] call.
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    /// Remote source.
    pub url: &'a str,
    /// File the backend writes into; created or truncated.
    pub destination: &'a Path,
    /// Human-readable label used in logs.
    pub label: &'a str,
    /// Cooperative cancellation signal for the current run.
    pub cancel: &'a CancellationToken,
}

/// How a transfer ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// All bytes were written and flushed.
    Completed {
        /// Bytes written to the destination.
        bytes: u64,
    },
    /// The cancellation token was observed; the destination is incomplete.
    Cancelled,
}

/// A source-specific transfer implementation.
///
/// Implementations must be cheap to query (`accepts` does no network I/O)
/// and must check `request.cancel` before each network call and between
/// body chunks.
#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &'static str;

    /// Ordering class within the registry.
    fn priority(&self) -> BackendPriority;

    /// Pure predicate on URL structure and host.
    fn accepts(&self, url: &str) -> bool;

    /// Best-effort remote filename discovery.
    ///
    /// `Ok(None)` means the backend could not determine a name; the pipeline
    /// then falls back to the entry identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::NotImplemented`] for recognised sources the
    /// backend cannot serve. Network trouble resolves to `Ok(None)`.
    async fn resolve_filename(&self, url: &str) -> Result<Option<String>, TransferError>;

    /// Streams `request.url` into `request.destination`, sending a
    /// [`TransferProgress`] after each chunk with non-decreasing byte counts.
    ///
    /// # Errors
    ///
    /// Returns a [`TransferError`] on network, HTTP, IO or service failures.
    async fn transfer(
        &self,
        request: TransferRequest<'_>,
        progress: ProgressSender,
    ) -> Result<TransferOutcome, TransferError>;
}

impl fmt::Debug for dyn TransferBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferBackend")
            .field("name", &self.name())
            .field("priority", &self.priority())
            .finish()
    }
}
