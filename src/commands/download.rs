//! Download command handler: run the orchestrator over catalog records.

use std::io::IsTerminal;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result, bail};
use organizer_core::{
    BatchState, BatchStatus, CatalogEntry, CatalogStore, DownloadOrchestrator, EntryStatus,
    build_default_registry,
};
use tracing::{debug, info, warn};

use super::{open_catalog, record_query};
use crate::ProcessExit;
use crate::app::context::RunContext;
use crate::app::{progress_manager, terminal};
use crate::cli::DownloadArgs;

pub async fn run_download_command(
    args: &DownloadArgs,
    ctx: RunContext,
    quiet: bool,
) -> Result<ProcessExit> {
    let ctx = match &args.models_root {
        Some(root) => ctx.with_models_root(root),
        None => ctx,
    };
    let mut settings = ctx.settings;
    if args.no_preview {
        settings.download_previews = false;
    }

    let catalog = Arc::new(open_catalog(&ctx.database_path).await?);
    let entries = select_entries(catalog.as_ref(), args).await?;
    let (entries, skipped): (Vec<_>, Vec<_>) =
        entries.into_iter().partition(CatalogEntry::is_downloadable);
    for entry in &skipped {
        warn!(id = ?entry.id, name = %entry.name, "record has no download URL; skipped");
    }

    if entries.is_empty() {
        info!("Nothing to download");
        if args.json {
            println!("{}", serde_json::to_string_pretty(&BatchState::default())?);
        }
        return Ok(ProcessExit::Success);
    }

    let registry = Arc::new(
        build_default_registry(&settings.client).context("Failed to build HTTP clients")?,
    );
    let orchestrator = Arc::new(DownloadOrchestrator::new(registry, catalog, settings));

    info!(entries = entries.len(), "Starting downloads");
    orchestrator.start(entries);

    let use_spinner = terminal::should_use_spinner(
        std::io::stderr().is_terminal(),
        quiet,
        args.json,
        terminal::is_dumb_terminal(),
    );
    let (progress_handle, progress_stop) =
        progress_manager::spawn_progress_ui(use_spinner, Arc::clone(&orchestrator));

    tokio::select! {
        () = orchestrator.wait() => {}
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    warn!("Interrupt received; stopping downloads");
                    orchestrator.stop().await;
                }
                Err(error) => {
                    debug!(%error, "ctrl-c handler unavailable");
                    orchestrator.wait().await;
                }
            }
        }
    }

    progress_stop.store(true, Ordering::SeqCst);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    let state = orchestrator.state();
    if args.json {
        println!("{}", serde_json::to_string_pretty(state.as_ref())?);
    } else if !quiet {
        print!("{}", render_summary(&state));
    }

    Ok(exit_for(state.status))
}

/// Explicit ids keep their order; otherwise the filter decides.
async fn select_entries(
    catalog: &dyn CatalogStore,
    args: &DownloadArgs,
) -> Result<Vec<CatalogEntry>> {
    if !args.ids.is_empty() {
        let mut entries = Vec::with_capacity(args.ids.len());
        for &id in &args.ids {
            match catalog.get_by_id(id).await? {
                Some(entry) => entries.push(entry),
                None => bail!("No catalog record with id {id}"),
            }
        }
        return Ok(entries);
    }

    let mut query = record_query(&args.filter);
    if !args.all {
        query = query.not_downloaded();
    }
    Ok(catalog.query(&query).await?)
}

pub(crate) fn exit_for(status: BatchStatus) -> ProcessExit {
    match status {
        BatchStatus::Error => ProcessExit::Failure,
        BatchStatus::Cancelled => ProcessExit::Interrupted,
        BatchStatus::Idle | BatchStatus::InProgress | BatchStatus::Completed => {
            ProcessExit::Success
        }
    }
}

pub(crate) fn render_summary(state: &BatchState) -> String {
    let mut out = String::new();
    for entry in &state.entries {
        let detail = match entry.status {
            EntryStatus::Error => entry
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            _ => entry
                .destination
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_default(),
        };
        out.push_str(&format!(
            "{:<11}  {}  {detail}\n",
            entry.status.as_str(),
            entry.name
        ));
        if let Some(preview_error) = &entry.preview_error {
            out.push_str(&format!("{:<11}  preview failed: {preview_error}\n", ""));
        }
    }
    if let Some(error) = &state.error {
        out.push_str(&format!("Batch error: {error}\n"));
    }
    out.push_str(&format!("Batch {}\n", state.status.as_str()));
    out
}
