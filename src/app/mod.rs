//! Binary-side plumbing: configuration, runtime context and terminal UI.

pub(crate) mod config;
pub(crate) mod context;
pub(crate) mod progress_manager;
pub(crate) mod terminal;
