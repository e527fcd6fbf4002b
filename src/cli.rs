//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use organizer_core::ModelType;

/// Download and catalog machine-learning model files.
///
/// Model-organizer keeps a catalog of model records and fetches the model
/// files and their preview images into per-type directories.
#[derive(Parser, Debug)]
#[command(name = "model-organizer")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the catalog database
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// API token sent with HTTP downloads (falls back to MODEL_ORGANIZER_API_KEY)
    #[arg(long, global = true, value_name = "TOKEN")]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Add a model record to the catalog
    Add(AddArgs),
    /// List catalog records
    List(ListArgs),
    /// Download model files (and previews) for catalog records
    Download(DownloadArgs),
}

impl Command {
    /// Stable name for log fields.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::List(_) => "list",
            Self::Download(_) => "download",
        }
    }
}

/// Arguments for `add`.
#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Display name of the model
    #[arg(long)]
    pub name: String,

    /// Model type (checkpoint, vae, lora, hypernetwork, embedding, other)
    #[arg(long = "type", value_name = "TYPE")]
    pub model_type: ModelType,

    /// Direct download link or share link
    #[arg(long, value_name = "URL")]
    pub download_url: String,

    /// Model page URL
    #[arg(long, value_name = "URL", default_value = "")]
    pub url: String,

    /// Preview image URL
    #[arg(long, value_name = "URL", default_value = "")]
    pub preview_url: String,

    /// Free-form description
    #[arg(long, default_value = "")]
    pub description: String,

    /// Subdirectory below the type's default directory
    #[arg(long, default_value = "")]
    pub subdir: String,

    /// Explicit destination directory (overrides type directory and subdir)
    #[arg(long, value_name = "DIR")]
    pub download_path: Option<PathBuf>,

    /// Explicit file name for the model file
    #[arg(long)]
    pub filename: Option<String>,

    /// Group label (repeatable)
    #[arg(long = "group", value_name = "GROUP")]
    pub groups: Vec<String>,
}

/// Catalog filters shared by `list` and `download`.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only records whose name contains this text (case-insensitive)
    #[arg(long)]
    pub name: Option<String>,

    /// Only records carrying this group label (repeatable, all must match)
    #[arg(long = "group", value_name = "GROUP")]
    pub groups: Vec<String>,

    /// Only records of this model type (repeatable, any may match)
    #[arg(long = "type", value_name = "TYPE")]
    pub model_types: Vec<ModelType>,
}

/// Arguments for `list`.
#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Only records whose model file is not on disk yet
    #[arg(long)]
    pub not_downloaded: bool,

    /// Print records as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `download`.
#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    /// Download only these record ids, in the given order (repeatable)
    #[arg(long = "id", value_name = "ID")]
    pub ids: Vec<i64>,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Also run records whose model file already exists
    #[arg(long)]
    pub all: bool,

    /// Root directory holding the per-type model directories
    #[arg(long, value_name = "DIR")]
    pub models_root: Option<PathBuf>,

    /// Skip preview images
    #[arg(long)]
    pub no_preview: bool,

    /// Print the final state tree as JSON
    #[arg(long)]
    pub json: bool,
}
