//! Settings consumed by the download pipeline.

use std::path::{Path, PathBuf};

use crate::backend::ClientOptions;
use crate::catalog::ModelType;

/// Default download directory per model type.
///
/// `Other` never has a default; such entries need an explicit
/// `download_path`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelDirectories {
    /// Directory for [`ModelType::Checkpoint`].
    pub checkpoint: Option<PathBuf>,
    /// Directory for [`ModelType::Vae`].
    pub vae: Option<PathBuf>,
    /// Directory for [`ModelType::Lora`].
    pub lora: Option<PathBuf>,
    /// Directory for [`ModelType::HyperNetwork`].
    pub hypernetwork: Option<PathBuf>,
    /// Directory for [`ModelType::Embedding`].
    pub embedding: Option<PathBuf>,
}

impl ModelDirectories {
    /// Lays out the conventional `models/<Kind>` tree under `root`.
    #[must_use]
    pub fn under(root: &Path) -> Self {
        Self {
            checkpoint: Some(root.join("Stable-diffusion")),
            vae: Some(root.join("VAE")),
            lora: Some(root.join("Lora")),
            hypernetwork: Some(root.join("hypernetworks")),
            embedding: Some(root.join("embeddings")),
        }
    }

    /// Default directory for `model_type`, if any.
    #[must_use]
    pub fn for_type(&self, model_type: ModelType) -> Option<&Path> {
        match model_type {
            ModelType::Checkpoint => self.checkpoint.as_deref(),
            ModelType::Vae => self.vae.as_deref(),
            ModelType::Lora => self.lora.as_deref(),
            ModelType::HyperNetwork => self.hypernetwork.as_deref(),
            ModelType::Embedding => self.embedding.as_deref(),
            ModelType::Other => None,
        }
    }
}

/// Pipeline behaviour and backend network settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    /// Default destination directories.
    pub directories: ModelDirectories,
    /// Whether preview images are fetched after the model file.
    pub download_previews: bool,
    /// Token and timeouts handed to the backends.
    pub client: ClientOptions,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            directories: ModelDirectories::default(),
            download_previews: true,
            client: ClientOptions::default(),
        }
    }
}
