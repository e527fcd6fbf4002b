//! Progress UI (spinner) for download runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use organizer_core::{BatchState, DownloadOrchestrator, EntryStatus};

/// Spawns the progress UI (spinner) when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    orchestrator: Arc<DownloadOrchestrator>,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_spinner_inner(orchestrator, Arc::clone(&stop));
    (Some(handle), stop)
}

fn spawn_spinner_inner(
    orchestrator: Arc<DownloadOrchestrator>,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        let mut last_delta = None;
        while !stop.load(Ordering::SeqCst) {
            // Only redraw when the orchestrator published something new.
            let delta = orchestrator.latest_state();
            if last_delta.as_ref().is_none_or(|last| !Arc::ptr_eq(last, &delta)) {
                spinner.set_message(progress_message(&orchestrator.state()));
                last_delta = Some(delta);
            }
            tokio::time::sleep(Duration::from_millis(120)).await;
        }

        spinner.finish_and_clear();
    })
}

/// One-line summary of the batch: position, current entry and its transfer.
pub(crate) fn progress_message(state: &BatchState) -> String {
    let total = state.entries.len();
    let done = state
        .entries
        .iter()
        .filter(|entry| entry.status.is_terminal())
        .count();

    let Some(current) = state
        .entries
        .iter()
        .find(|entry| entry.status == EntryStatus::InProgress)
    else {
        return format!("[{done}/{total}] {}", state.status.as_str());
    };

    let position = (done + 1).min(total);
    let label = current.filename.as_deref().unwrap_or(&current.name);
    let (progress, stage) = match (&current.preview_progress, &current.progress) {
        (Some(preview), _) => (preview, "preview "),
        (None, Some(model)) => (model, ""),
        (None, None) => return format!("[{position}/{total}] {label}: resolving..."),
    };

    let amount = match progress.bytes_total {
        Some(total_bytes) => format!(
            "{}/{}",
            HumanBytes(progress.bytes_ready),
            HumanBytes(total_bytes)
        ),
        None => HumanBytes(progress.bytes_ready).to_string(),
    };
    let percent = progress
        .fraction()
        .map(|fraction| format!(" {:.0}%", fraction * 100.0))
        .unwrap_or_default();

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rate = HumanBytes(progress.rate.max(0.0) as u64);
    format!("[{position}/{total}] {label}: {stage}{amount}{percent} ({rate}/s)")
}
