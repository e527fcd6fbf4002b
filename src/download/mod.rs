//! Download orchestration for catalog entries.
//!
//! This module sequences downloads of a batch of entries, one at a time,
//! delegating each transfer to a backend from the registry.
//!
//! # Features
//!
//! - Ordered, single-stream batch runs with cooperative cancellation
//! - Temp-file transfers published with a no-clobber rename
//! - MD5 and SHA-256 checksums persisted back to the catalog
//! - Optional preview image next to each model file
//! - Copy-on-write state tree plus latest delta for polling observers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use organizer_core::backend::{ClientOptions, build_default_registry};
//! use organizer_core::catalog::{RecordQuery, CatalogStore, SqliteCatalog};
//! use organizer_core::download::{DownloadOrchestrator, DownloadSettings};
//! use organizer_core::Database;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = Arc::new(SqliteCatalog::new(Database::new_in_memory().await?));
//! let entries = catalog.query(&RecordQuery::default().not_downloaded()).await?;
//! let registry = Arc::new(build_default_registry(&ClientOptions::default())?);
//!
//! let orchestrator = DownloadOrchestrator::new(registry, catalog, DownloadSettings::default());
//! orchestrator.start(entries);
//! orchestrator.wait().await;
//! println!("batch finished: {:?}", orchestrator.state().status);
//! # Ok(())
//! # }
//! ```

mod error;
pub mod filename;
mod hashing;
mod orchestrator;
mod pipeline;
mod settings;
mod state;

pub use error::{ErrorInfo, PipelineError};
pub use hashing::{FileHashes, hash_file};
pub use orchestrator::{DownloadOrchestrator, StartOutcome};
pub use pipeline::{DownloadPipeline, EntryOutcome, UpdateSink};
pub use settings::{DownloadSettings, ModelDirectories};
pub use state::{
    BatchDelta, BatchState, BatchStatus, EntryDelta, EntryState, EntryStatus, EntryUpdate,
};
