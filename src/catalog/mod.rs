//! Catalog persistence for model entries.
//!
//! The download pipeline only needs three operations from a store:
//! fetch an entry by id, write back download results, and query entries
//! by filter. They are expressed by [`CatalogStore`] so the orchestrator can
//! run against the `SQLite` implementation ([`SqliteCatalog`]) or any
//! in-memory double.
//!
//! # Example
//!
//! ```ignore
//! use organizer_core::catalog::{CatalogEntry, CatalogStore, ModelType, RecordQuery, SqliteCatalog};
//! use organizer_core::Database;
//!
//! let catalog = SqliteCatalog::new(Database::new_in_memory().await?);
//! let id = catalog.insert(&CatalogEntry::new("vae", ModelType::Vae, "https://example.com/v.pt")).await?;
//! let pending = catalog.query(&RecordQuery::default().not_downloaded()).await?;
//! ```

mod entry;
mod error;

pub use entry::{CatalogEntry, ModelType};
pub use error::CatalogError;

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, instrument};

use crate::db::Database;
use entry::{RecordRow, join_groups};

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

const SELECT_COLUMNS: &str = "SELECT id, name, model_type, download_url, url, download_path, \
     download_filename, preview_url, description, positive_prompts, negative_prompts, \
     sha256_hash, md5_hash, created_at, COALESCE(groups, '') AS groups, subdir, location \
     FROM record";

/// Filter for [`CatalogStore::query`].
///
/// Empty filter fields match everything. Groups must all be present on an
/// entry; types match if any one equals the entry's type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    /// Case-insensitive substring of the entry name.
    pub name: Option<String>,
    /// Every listed group must be attached to the entry.
    pub groups: Vec<String>,
    /// Entry type must be one of these.
    pub model_types: Vec<ModelType>,
    /// `Some(true)`: only entries whose location exists on disk; `Some(false)`: the rest.
    pub downloaded: Option<bool>,
}

impl RecordQuery {
    /// Restricts the query to entries that were never downloaded.
    #[must_use]
    pub fn not_downloaded(mut self) -> Self {
        self.downloaded = Some(false);
        self
    }

    /// Restricts the query to entries carrying `group`.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// Restricts the query to entries of `model_type`.
    #[must_use]
    pub fn with_type(mut self, model_type: ModelType) -> Self {
        self.model_types.push(model_type);
        self
    }
}

/// Store contract used by the download pipeline.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Fetches one entry; `Ok(None)` when the id is unknown.
    async fn get_by_id(&self, id: i64) -> Result<Option<CatalogEntry>>;

    /// Persists every field of an existing entry.
    async fn update(&self, entry: &CatalogEntry) -> Result<()>;

    /// Returns entries matching `filter`, ordered by id.
    async fn query(&self, filter: &RecordQuery) -> Result<Vec<CatalogEntry>>;
}

/// `SQLite`-backed catalog.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    db: Database,
}

impl SqliteCatalog {
    /// Creates a catalog over an already migrated database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts a new entry and returns its identifier.
    ///
    /// `created_at` is stamped with the current time when the entry carries 0.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the insert fails.
    #[instrument(skip(self, entry), fields(name = %entry.name))]
    pub async fn insert(&self, entry: &CatalogEntry) -> Result<i64> {
        let created_at = if entry.created_at == 0 {
            unix_now()
        } else {
            entry.created_at
        };

        let result = sqlx::query(
            r"INSERT INTO record (
                name, model_type, download_url, url, download_path, download_filename,
                preview_url, description, positive_prompts, negative_prompts,
                sha256_hash, md5_hash, created_at, groups, subdir, location
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.name)
        .bind(entry.model_type.as_str())
        .bind(&entry.download_url)
        .bind(&entry.url)
        .bind(path_column(entry.download_path.as_deref()))
        .bind(entry.download_filename.as_deref().unwrap_or_default())
        .bind(&entry.preview_url)
        .bind(&entry.description)
        .bind(&entry.positive_prompts)
        .bind(&entry.negative_prompts)
        .bind(entry.sha256_hash.as_deref().unwrap_or_default())
        .bind(entry.md5_hash.as_deref().unwrap_or_default())
        .bind(created_at)
        .bind(join_groups(&entry.groups))
        .bind(&entry.subdir)
        .bind(path_column(entry.location.as_deref()))
        .execute(self.db.pool())
        .await?;

        let id = result.last_insert_rowid();
        debug!(id, "catalog entry inserted");
        Ok(id)
    }

    /// Deletes an entry.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if no row has `id`.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM record WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        check_affected(id, result.rows_affected())
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    #[instrument(skip(self))]
    async fn get_by_id(&self, id: i64) -> Result<Option<CatalogEntry>> {
        let row: Option<RecordRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        row.map(CatalogEntry::try_from).transpose()
    }

    #[instrument(skip(self, entry), fields(id = ?entry.id, name = %entry.name))]
    async fn update(&self, entry: &CatalogEntry) -> Result<()> {
        let id = entry.id.ok_or_else(|| CatalogError::MissingId {
            name: entry.name.clone(),
        })?;

        let result = sqlx::query(
            r"UPDATE record SET
                name = ?, model_type = ?, download_url = ?, url = ?, download_path = ?,
                download_filename = ?, preview_url = ?, description = ?,
                positive_prompts = ?, negative_prompts = ?, sha256_hash = ?, md5_hash = ?,
                groups = ?, subdir = ?, location = ?
            WHERE id = ?",
        )
        .bind(&entry.name)
        .bind(entry.model_type.as_str())
        .bind(&entry.download_url)
        .bind(&entry.url)
        .bind(path_column(entry.download_path.as_deref()))
        .bind(entry.download_filename.as_deref().unwrap_or_default())
        .bind(&entry.preview_url)
        .bind(&entry.description)
        .bind(&entry.positive_prompts)
        .bind(&entry.negative_prompts)
        .bind(entry.sha256_hash.as_deref().unwrap_or_default())
        .bind(entry.md5_hash.as_deref().unwrap_or_default())
        .bind(join_groups(&entry.groups))
        .bind(&entry.subdir)
        .bind(path_column(entry.location.as_deref()))
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected(id, result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn query(&self, filter: &RecordQuery) -> Result<Vec<CatalogEntry>> {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(SELECT_COLUMNS);
        builder.push(" WHERE 1 = 1");

        if let Some(name) = filter.name.as_deref().filter(|n| !n.trim().is_empty()) {
            builder
                .push(" AND LOWER(name) LIKE ")
                .push_bind(format!("%{}%", name.trim().to_lowercase()));
        }

        // Groups are stored comma-joined; wrap both sides in commas so "art"
        // does not match "artist".
        for group in filter.groups.iter().map(|g| g.trim()).filter(|g| !g.is_empty()) {
            builder
                .push(" AND (',' || COALESCE(groups, '') || ',') LIKE ")
                .push_bind(format!("%,{group},%"));
        }

        if !filter.model_types.is_empty() {
            builder.push(" AND model_type IN (");
            let mut separated = builder.separated(", ");
            for model_type in &filter.model_types {
                separated.push_bind(model_type.as_str());
            }
            separated.push_unseparated(")");
        }

        builder.push(" ORDER BY id");

        let rows: Vec<RecordRow> = builder
            .build_query_as()
            .fetch_all(self.db.pool())
            .await?;

        // A recorded location only counts while the file is still on disk.
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let entry = CatalogEntry::try_from(row)?;
            if filter
                .downloaded
                .is_none_or(|wanted| entry.is_downloaded() == wanted)
            {
                entries.push(entry);
            }
        }
        debug!(count = entries.len(), "catalog query finished");
        Ok(entries)
    }
}

fn check_affected(id: i64, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(CatalogError::NotFound(id))
    } else {
        Ok(())
    }
}

fn path_column(path: Option<&std::path::Path>) -> String {
    path.map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
