//! Model Organizer Core Library
//!
//! This library provides the core functionality for the model organizer,
//! which downloads machine-learning model files and their preview images
//! into a local catalog with integrity metadata.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection and schema management
//! - [`catalog`] - Catalog entries and the store contract
//! - [`backend`] - Pluggable transfer backends and their registry
//! - [`download`] - Per-entry pipeline and batch orchestrator

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod catalog;
pub mod db;
pub mod download;
mod user_agent;

// Re-export commonly used types
pub use backend::{
    BackendPriority, BackendRegistry, ClientOptions, SelectionError, TransferBackend,
    TransferError, TransferOutcome, TransferProgress, TransferRequest, build_default_registry,
};
pub use catalog::{CatalogEntry, CatalogError, CatalogStore, ModelType, RecordQuery, SqliteCatalog};
pub use db::{Database, DbError};
pub use download::{
    BatchState, BatchStatus, DownloadOrchestrator, DownloadSettings, EntryStatus, ErrorInfo,
    ModelDirectories, StartOutcome,
};
