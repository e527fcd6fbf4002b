//! Shared runtime context built from CLI flags, environment and config file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use organizer_core::{ClientOptions, DownloadSettings, ModelDirectories};

use super::config::{FileConfig, env_var_non_empty_os, resolve_default_database_path};
use crate::cli::Cli;

/// Environment variable holding the API token when `--api-key` is absent.
pub(crate) const API_KEY_ENV: &str = "MODEL_ORGANIZER_API_KEY";

/// Effective settings for one command invocation.
#[derive(Debug, Clone)]
pub(crate) struct RunContext {
    pub(crate) database_path: PathBuf,
    pub(crate) settings: DownloadSettings,
}

impl RunContext {
    /// Resolves flags over environment over file values over defaults.
    pub(crate) fn resolve(cli: &Cli, file: Option<&FileConfig>) -> Self {
        let env_api_key = env_var_non_empty_os(API_KEY_ENV).and_then(|v| v.into_string().ok());
        Self::resolve_with(cli, file, env_api_key, resolve_default_database_path())
    }

    fn resolve_with(
        cli: &Cli,
        file: Option<&FileConfig>,
        env_api_key: Option<String>,
        default_database: PathBuf,
    ) -> Self {
        let file = file.cloned().unwrap_or_default();

        let database_path = cli
            .db
            .clone()
            .or_else(|| file.database_path.clone())
            .unwrap_or(default_database);

        let api_token = cli
            .api_key
            .clone()
            .or(env_api_key)
            .or_else(|| file.api_key.clone());

        let defaults = ClientOptions::default();
        let client = ClientOptions {
            api_token,
            connect_timeout: secs_or(file.connect_timeout_secs, defaults.connect_timeout),
            read_timeout: secs_or(file.read_timeout_secs, defaults.read_timeout),
            probe_timeout: secs_or(file.probe_timeout_secs, defaults.probe_timeout),
        };

        let settings = DownloadSettings {
            directories: ModelDirectories {
                checkpoint: file.checkpoint_dir,
                vae: file.vae_dir,
                lora: file.lora_dir,
                hypernetwork: file.hypernetwork_dir,
                embedding: file.embedding_dir,
            },
            download_previews: file.download_previews.unwrap_or(true),
            client,
        };

        Self {
            database_path,
            settings,
        }
    }

    /// Replaces every type directory with the standard layout under `root`.
    pub(crate) fn with_models_root(mut self, root: &Path) -> Self {
        self.settings.directories = ModelDirectories::under(root);
        self
    }
}

fn secs_or(value: Option<u64>, default: Duration) -> Duration {
    value.map_or(default, Duration::from_secs)
}
