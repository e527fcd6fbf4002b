//! CLI command handlers.

mod catalog;
mod download;

use std::path::Path;

use anyhow::{Context, Result};
use organizer_core::{Database, RecordQuery, SqliteCatalog};

use crate::cli::FilterArgs;

pub use catalog::{run_add_command, run_list_command};
pub use download::run_download_command;

/// Opens (creating and migrating if needed) the catalog database at `path`.
async fn open_catalog(path: &Path) -> Result<SqliteCatalog> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory '{}'", parent.display())
        })?;
    }
    let db = Database::new(path)
        .await
        .with_context(|| format!("Failed to open catalog database '{}'", path.display()))?;
    Ok(SqliteCatalog::new(db))
}

fn record_query(filter: &FilterArgs) -> RecordQuery {
    RecordQuery {
        name: filter.name.clone(),
        groups: filter.groups.clone(),
        model_types: filter.model_types.clone(),
        downloaded: None,
    }
}
