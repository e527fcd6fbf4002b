//! Batch orchestrator: one worker per run, copy-on-write state for observers.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::error::ErrorInfo;
use super::pipeline::{DownloadPipeline, EntryOutcome};
use super::settings::DownloadSettings;
use super::state::{BatchDelta, BatchState, BatchStatus, EntrySeed, EntryUpdate, StateStore};
use crate::backend::BackendRegistry;
use crate::catalog::{CatalogEntry, CatalogStore};

/// Result of [`DownloadOrchestrator::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new run was spawned.
    Started,
    /// A run is already active; the call was ignored.
    AlreadyRunning,
}

#[derive(Debug, Clone)]
struct ActiveRun {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

/// Drives the download pipeline over batches of catalog entries.
///
/// Only one run is active at a time. Entries are processed strictly in the
/// order given, one at a time.
///
/// # Example
///
/// ```ignore
/// let orchestrator = DownloadOrchestrator::new(registry, catalog, settings);
/// orchestrator.start(entries);
/// orchestrator.wait().await;
/// println!("{:?}", orchestrator.state().status);
/// ```
#[derive(Debug)]
pub struct DownloadOrchestrator {
    pipeline: Arc<DownloadPipeline>,
    store: Arc<StateStore>,
    running: Arc<AtomicBool>,
    active: Mutex<Option<ActiveRun>>,
    runs_started: AtomicU64,
}

impl DownloadOrchestrator {
    /// Creates an idle orchestrator.
    #[must_use]
    pub fn new(
        registry: Arc<BackendRegistry>,
        catalog: Arc<dyn CatalogStore>,
        settings: DownloadSettings,
    ) -> Self {
        Self {
            pipeline: Arc::new(DownloadPipeline::new(registry, catalog, settings)),
            store: Arc::new(StateStore::default()),
            running: Arc::new(AtomicBool::new(false)),
            active: Mutex::new(None),
            runs_started: AtomicU64::new(0),
        }
    }

    /// Starts a run over `entries` unless one is already active.
    ///
    /// Clears the previous state, marks every entry Pending and spawns the
    /// worker. Must be called from within a Tokio runtime.
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub fn start(&self, entries: Vec<CatalogEntry>) -> StartOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("download already running; start request ignored");
            return StartOutcome::AlreadyRunning;
        }

        let keyed: Vec<(String, CatalogEntry)> =
            entry_keys(&entries).into_iter().zip(entries).collect();
        self.store.reset(
            keyed
                .iter()
                .map(|(key, entry)| EntrySeed {
                    key: key.clone(),
                    id: entry.id,
                    name: entry.name.clone(),
                })
                .collect(),
        );

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        *self.lock_active() = Some(ActiveRun {
            cancel: cancel.clone(),
            done: done_rx,
        });
        let run = self.runs_started.fetch_add(1, Ordering::SeqCst) + 1;
        info!(run, entries = keyed.len(), "download run started");

        let pipeline = Arc::clone(&self.pipeline);
        let store = Arc::clone(&self.store);
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            let worker = tokio::spawn(run_batch(pipeline, Arc::clone(&store), keyed, cancel));
            if let Err(join_error) = worker.await {
                error!(error = %join_error, "download worker crashed");
                store.set_status(
                    BatchStatus::Error,
                    Some(ErrorInfo::new("WorkerPanic", join_error.to_string())),
                );
            }
            running.store(false, Ordering::SeqCst);
            let _ = done_tx.send(true);
        });

        StartOutcome::Started
    }

    /// Signals cancellation and waits until the worker has fully unwound.
    ///
    /// A no-op (logged at debug) when no run is active.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let active = self.lock_active().clone();
        match active {
            Some(run) if self.is_running() => {
                info!("stopping download run");
                run.cancel.cancel();
                wait_done(run.done).await;
            }
            _ => debug!("stop requested but no download is running"),
        }
    }

    /// Waits for the current run to finish on its own.
    pub async fn wait(&self) {
        let active = self.lock_active().clone();
        if let Some(run) = active {
            wait_done(run.done).await;
        }
    }

    /// True while a run is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Full state tree of the current or last run.
    #[must_use]
    pub fn state(&self) -> Arc<BatchState> {
        self.store.snapshot()
    }

    /// Most recent incremental change.
    #[must_use]
    pub fn latest_state(&self) -> Arc<BatchDelta> {
        self.store.latest()
    }

    /// Number of runs started since construction.
    #[must_use]
    pub fn runs_started(&self) -> u64 {
        self.runs_started.load(Ordering::SeqCst)
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// State-tree keys in list order, unique within the batch.
///
/// The catalog id names the first entry carrying it; a repeated id gets
/// `{id}#{index}` and an unsaved entry `unsaved-{index}`.
fn entry_keys(entries: &[CatalogEntry]) -> Vec<String> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| match entry.id {
            Some(id) if seen.insert(id) => id.to_string(),
            Some(id) => {
                debug!(id, index, "catalog id repeated in batch");
                format!("{id}#{index}")
            }
            None => format!("unsaved-{index}"),
        })
        .collect()
}

async fn wait_done(mut done: watch::Receiver<bool>) {
    // A dropped sender also means the supervisor is gone.
    let _ = done.wait_for(|finished| *finished).await;
}

async fn run_batch(
    pipeline: Arc<DownloadPipeline>,
    store: Arc<StateStore>,
    entries: Vec<(String, CatalogEntry)>,
    cancel: CancellationToken,
) {
    for (key, mut entry) in entries {
        if cancel.is_cancelled() {
            break;
        }
        let sink = |update: EntryUpdate| {
            store.update_entry(&key, update);
        };
        let outcome = pipeline.run(&mut entry, &cancel, &sink).await;
        if outcome == EntryOutcome::Cancelled {
            break;
        }
    }

    if cancel.is_cancelled() {
        store.cancel_unfinished();
        store.set_status(BatchStatus::Cancelled, None);
        info!("download run cancelled");
        return;
    }

    let status = if store.snapshot().has_errors() {
        BatchStatus::Error
    } else {
        BatchStatus::Completed
    };
    store.set_status(status, None);
    info!(status = status.as_str(), "download run finished");
}
