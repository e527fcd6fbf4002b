//! Catalog entry types and model type classification.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::CatalogError;

/// Classification of a catalog entry; selects the default download directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    /// Full model checkpoint.
    Checkpoint,
    /// Variational autoencoder.
    Vae,
    /// LoRA adapter.
    Lora,
    /// Hypernetwork.
    HyperNetwork,
    /// Textual-inversion embedding.
    Embedding,
    /// Anything else; has no default directory.
    Other,
}

impl ModelType {
    /// All model types in display order.
    pub const ALL: [Self; 6] = [
        Self::Checkpoint,
        Self::Vae,
        Self::Lora,
        Self::HyperNetwork,
        Self::Embedding,
        Self::Other,
    ];

    /// Returns the stored/display label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checkpoint => "Stable Diffusion",
            Self::Vae => "VAE",
            Self::Lora => "Lora",
            Self::HyperNetwork => "Hyper Network",
            Self::Embedding => "Embedding",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ModelType {
    type Err = CatalogError;

    /// Accepts the stored label (`Stable Diffusion`) or a short CLI alias
    /// (`checkpoint`, `vae`, `lora`, `hypernetwork`, `embedding`, `other`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(found) = Self::ALL.iter().find(|t| t.as_str() == trimmed) {
            return Ok(*found);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "checkpoint" | "stable-diffusion" => Ok(Self::Checkpoint),
            "vae" => Ok(Self::Vae),
            "lora" => Ok(Self::Lora),
            "hypernetwork" | "hyper-network" => Ok(Self::HyperNetwork),
            "embedding" => Ok(Self::Embedding),
            "other" => Ok(Self::Other),
            _ => Err(CatalogError::InvalidModelType(trimmed.to_string())),
        }
    }
}

/// One catalog item describing a downloadable model and its metadata.
///
/// `location` is authoritative only after a download completed; the hashes
/// are trustworthy only while `location` points at an existing file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Store-assigned identifier; `None` for entries not yet saved.
    pub id: Option<i64>,
    /// Display name.
    pub name: String,
    /// Model classification.
    pub model_type: ModelType,
    /// Human-facing source page.
    pub url: String,
    /// Authoritative transfer source; empty means not downloadable.
    pub download_url: String,
    /// Destination directory override.
    pub download_path: Option<PathBuf>,
    /// Destination filename override.
    pub download_filename: Option<String>,
    /// Subdirectory below the destination directory (may be empty).
    pub subdir: String,
    /// Preview image URL (may be empty).
    pub preview_url: String,
    /// Free-text description.
    pub description: String,
    /// Positive prompt notes.
    pub positive_prompts: String,
    /// Negative prompt notes.
    pub negative_prompts: String,
    /// Fast checksum of the downloaded file (lowercase hex).
    pub md5_hash: Option<String>,
    /// Strong checksum of the downloaded file (lowercase hex).
    pub sha256_hash: Option<String>,
    /// Local file path, set after a completed download.
    pub location: Option<PathBuf>,
    /// Creation time as Unix seconds.
    pub created_at: i64,
    /// Free-form group labels.
    pub groups: Vec<String>,
}

impl CatalogEntry {
    /// Creates an unsaved entry with the required fields and empty metadata.
    #[must_use]
    pub fn new(name: impl Into<String>, model_type: ModelType, download_url: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            model_type,
            url: String::new(),
            download_url: download_url.into(),
            download_path: None,
            download_filename: None,
            subdir: String::new(),
            preview_url: String::new(),
            description: String::new(),
            positive_prompts: String::new(),
            negative_prompts: String::new(),
            md5_hash: None,
            sha256_hash: None,
            location: None,
            created_at: 0,
            groups: Vec::new(),
        }
    }

    /// Returns true when the entry has a transfer source.
    #[must_use]
    pub fn is_downloadable(&self) -> bool {
        !self.download_url.trim().is_empty()
    }

    /// Returns true when `location` is set and the file exists on disk.
    #[must_use]
    pub fn is_downloaded(&self) -> bool {
        self.location.as_deref().is_some_and(std::path::Path::exists)
    }
}

/// Raw `record` row; text columns use `''` for "unset".
#[derive(Debug, Clone, FromRow)]
pub(crate) struct RecordRow {
    pub id: i64,
    pub name: String,
    pub model_type: String,
    pub download_url: String,
    pub url: String,
    pub download_path: String,
    pub download_filename: String,
    pub preview_url: String,
    pub description: String,
    pub positive_prompts: String,
    pub negative_prompts: String,
    pub sha256_hash: String,
    pub md5_hash: String,
    pub created_at: i64,
    pub groups: String,
    pub subdir: String,
    pub location: String,
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

impl TryFrom<RecordRow> for CatalogEntry {
    type Error = CatalogError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Some(row.id),
            name: row.name,
            model_type: row.model_type.parse()?,
            url: row.url,
            download_url: row.download_url,
            download_path: non_empty(row.download_path).map(PathBuf::from),
            download_filename: non_empty(row.download_filename),
            subdir: row.subdir,
            preview_url: row.preview_url,
            description: row.description,
            positive_prompts: row.positive_prompts,
            negative_prompts: row.negative_prompts,
            md5_hash: non_empty(row.md5_hash),
            sha256_hash: non_empty(row.sha256_hash),
            location: non_empty(row.location).map(PathBuf::from),
            created_at: row.created_at,
            groups: split_groups(&row.groups),
        })
    }
}

pub(crate) fn split_groups(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(ToString::to_string)
        .collect()
}

pub(crate) fn join_groups(groups: &[String]) -> String {
    groups
        .iter()
        .map(|g| g.trim())
        .filter(|g| !g.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}
