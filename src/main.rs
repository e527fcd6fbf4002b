//! CLI entry point for the model organizer.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};

mod app;
mod cli;
mod commands;

use app::context::RunContext;
use app::{config, terminal};
use cli::{Cli, Command};

/// Process exit outcome for a command run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Everything finished without error.
    Success,
    /// At least one download failed.
    Failure,
    /// The run was stopped by an interrupt.
    Interrupted,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Failure => ExitCode::from(1),
            ProcessExit::Interrupted => ExitCode::from(130),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    terminal::init_tracing(terminal::default_log_level(cli.verbose, cli.quiet));
    debug!(command = cli.command.name(), "CLI arguments parsed");

    let loaded = config::load_default_file_config()?;
    if let Some(path) = loaded.path.as_deref().filter(|_| loaded.config.is_some()) {
        debug!(path = %path.display(), "configuration file loaded");
    }
    let ctx = RunContext::resolve(&cli, loaded.config.as_ref());
    debug!(database = %ctx.database_path.display(), "catalog location resolved");

    let exit = match &cli.command {
        Command::Add(args) => {
            commands::run_add_command(args, &ctx).await?;
            ProcessExit::Success
        }
        Command::List(args) => {
            commands::run_list_command(args, &ctx).await?;
            ProcessExit::Success
        }
        Command::Download(args) => {
            info!("Model organizer starting downloads");
            commands::run_download_command(args, ctx, cli.quiet).await?
        }
    };

    Ok(exit.into())
}
