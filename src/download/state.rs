//! Batch state tree and its copy-on-write store.
//!
//! Readers get `Arc` snapshots; every update clones the tree, applies the
//! change and swaps the pointer, so a snapshot is never observed half-applied.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ErrorInfo;
use crate::backend::TransferProgress;

/// Overall status of a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    /// No run has started yet.
    #[default]
    Idle,
    /// The worker is processing entries.
    InProgress,
    /// Every entry finished without error.
    Completed,
    /// At least one entry failed, or the worker crashed.
    Error,
    /// The run was stopped.
    Cancelled,
}

impl BatchStatus {
    /// Display label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Error => "Error",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// Status of one entry within a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    /// Waiting for the worker.
    #[default]
    Pending,
    /// Being processed.
    InProgress,
    /// Downloaded, hashed and persisted.
    Completed,
    /// Destination file was already present.
    Exists,
    /// Failed; see the entry error.
    Error,
    /// Run stopped before the entry finished.
    Cancelled,
}

impl EntryStatus {
    /// Terminal statuses are never changed again within a run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Exists | Self::Error | Self::Cancelled
        )
    }

    /// Display label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Exists => "Exists",
            Self::Error => "Error",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// Everything known about one entry in the current run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryState {
    /// Key in the state tree: the catalog id, or `unsaved-<index>`.
    pub key: String,
    /// Catalog id, if the entry was saved.
    pub id: Option<i64>,
    /// Display name.
    pub name: String,
    /// Current status.
    pub status: EntryStatus,
    /// Resolved model filename.
    pub filename: Option<String>,
    /// Resolved model path.
    pub destination: Option<PathBuf>,
    /// Latest model transfer snapshot.
    pub progress: Option<TransferProgress>,
    /// Resolved preview filename.
    pub preview_filename: Option<String>,
    /// Resolved preview path.
    pub preview_destination: Option<PathBuf>,
    /// Latest preview transfer snapshot.
    pub preview_progress: Option<TransferProgress>,
    /// Fatal error for this entry.
    pub error: Option<ErrorInfo>,
    /// Non-fatal preview error.
    pub preview_error: Option<ErrorInfo>,
}

/// Partial change to an [`EntryState`]; `None` fields leave the state as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryUpdate {
    /// New status.
    pub status: Option<EntryStatus>,
    /// Resolved model filename.
    pub filename: Option<String>,
    /// Resolved model path.
    pub destination: Option<PathBuf>,
    /// Model transfer snapshot.
    pub progress: Option<TransferProgress>,
    /// Resolved preview filename.
    pub preview_filename: Option<String>,
    /// Resolved preview path.
    pub preview_destination: Option<PathBuf>,
    /// Preview transfer snapshot.
    pub preview_progress: Option<TransferProgress>,
    /// Fatal error.
    pub error: Option<ErrorInfo>,
    /// Non-fatal preview error.
    pub preview_error: Option<ErrorInfo>,
}

impl EntryUpdate {
    /// Status change.
    #[must_use]
    pub fn status(status: EntryStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Failure: status `Error` plus the captured error.
    #[must_use]
    pub fn failed(error: ErrorInfo) -> Self {
        Self {
            status: Some(EntryStatus::Error),
            error: Some(error),
            ..Self::default()
        }
    }

    /// Model transfer snapshot.
    #[must_use]
    pub fn progress(progress: TransferProgress) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }

    /// Preview transfer snapshot.
    #[must_use]
    pub fn preview_progress(progress: TransferProgress) -> Self {
        Self {
            preview_progress: Some(progress),
            ..Self::default()
        }
    }

    fn merge_into(&self, state: &mut EntryState) {
        if let Some(status) = self.status {
            state.status = status;
        }
        merge_field(&mut state.filename, &self.filename);
        merge_field(&mut state.destination, &self.destination);
        merge_field(&mut state.progress, &self.progress);
        merge_field(&mut state.preview_filename, &self.preview_filename);
        merge_field(&mut state.preview_destination, &self.preview_destination);
        merge_field(&mut state.preview_progress, &self.preview_progress);
        merge_field(&mut state.error, &self.error);
        merge_field(&mut state.preview_error, &self.preview_error);
    }
}

fn merge_field<T: Clone>(target: &mut Option<T>, update: &Option<T>) {
    if let Some(value) = update {
        *target = Some(value.clone());
    }
}

/// Full state tree of the current (or last) run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchState {
    /// Overall status.
    pub status: BatchStatus,
    /// Batch-level failure (worker crash).
    pub error: Option<ErrorInfo>,
    /// Per-entry states in submission order.
    pub entries: Vec<EntryState>,
}

impl BatchState {
    /// Looks up an entry by its state-tree key.
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<&EntryState> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Looks up an entry by catalog id.
    #[must_use]
    pub fn entry_by_id(&self, id: i64) -> Option<&EntryState> {
        self.entries.iter().find(|e| e.id == Some(id))
    }

    /// True if any entry ended in `Error`.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.status == EntryStatus::Error)
    }
}

/// The change applied by the most recent update, for differential polling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchDelta {
    /// New batch status, if it changed.
    pub status: Option<BatchStatus>,
    /// Batch-level failure, if one was recorded.
    pub error: Option<ErrorInfo>,
    /// Key and update of the entry that changed.
    pub entry: Option<EntryDelta>,
}

/// Entry part of a [`BatchDelta`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDelta {
    /// State-tree key of the entry.
    pub key: String,
    /// The update as it was applied.
    pub update: EntryUpdate,
}

#[derive(Debug, Default)]
struct Published {
    state: Arc<BatchState>,
    latest: Arc<BatchDelta>,
}

/// Seed for one entry when a run starts.
#[derive(Debug, Clone)]
pub(crate) struct EntrySeed {
    pub key: String,
    pub id: Option<i64>,
    pub name: String,
}

/// Copy-on-write holder of the state tree and latest delta.
#[derive(Debug, Default)]
pub(crate) struct StateStore {
    inner: RwLock<Published>,
}

impl StateStore {
    pub(crate) fn snapshot(&self) -> Arc<BatchState> {
        Arc::clone(&self.read().state)
    }

    pub(crate) fn latest(&self) -> Arc<BatchDelta> {
        Arc::clone(&self.read().latest)
    }

    /// Replaces the tree with a fresh in-progress run; all entries Pending.
    pub(crate) fn reset(&self, seeds: Vec<EntrySeed>) {
        let entries = seeds
            .into_iter()
            .map(|seed| EntryState {
                key: seed.key,
                id: seed.id,
                name: seed.name,
                ..EntryState::default()
            })
            .collect();
        let mut published = self.write();
        published.state = Arc::new(BatchState {
            status: BatchStatus::InProgress,
            error: None,
            entries,
        });
        published.latest = Arc::new(BatchDelta {
            status: Some(BatchStatus::InProgress),
            ..BatchDelta::default()
        });
    }

    pub(crate) fn set_status(&self, status: BatchStatus, error: Option<ErrorInfo>) {
        let mut published = self.write();
        let mut next = BatchState::clone(&published.state);
        next.status = status;
        if error.is_some() {
            next.error.clone_from(&error);
        }
        published.state = Arc::new(next);
        published.latest = Arc::new(BatchDelta {
            status: Some(status),
            error,
            entry: None,
        });
    }

    /// Merges `update` into the entry; ignored once the entry is terminal.
    ///
    /// Returns whether the update was applied.
    pub(crate) fn update_entry(&self, key: &str, update: EntryUpdate) -> bool {
        let mut published = self.write();
        let Some(index) = published.state.entries.iter().position(|e| e.key == key) else {
            debug!(key, "update for unknown entry ignored");
            return false;
        };
        if published.state.entries[index].status.is_terminal() {
            debug!(key, "update for finished entry ignored");
            return false;
        }

        let mut next = BatchState::clone(&published.state);
        update.merge_into(&mut next.entries[index]);
        published.state = Arc::new(next);
        published.latest = Arc::new(BatchDelta {
            status: None,
            error: None,
            entry: Some(EntryDelta {
                key: key.to_string(),
                update,
            }),
        });
        true
    }

    /// Marks every non-terminal entry Cancelled.
    pub(crate) fn cancel_unfinished(&self) {
        let mut published = self.write();
        let mut next = BatchState::clone(&published.state);
        for entry in next.entries.iter_mut().filter(|e| !e.status.is_terminal()) {
            entry.status = EntryStatus::Cancelled;
        }
        published.state = Arc::new(next);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Published> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Published> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
