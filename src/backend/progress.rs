//! Transfer progress snapshots.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Capacity of the per-transfer progress channel.
///
/// A full channel suspends the backend until the pipeline catches up.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Weight of the newest sample in the smoothed rate.
const RATE_SMOOTHING: f64 = 0.3;

/// Sending half handed to [`TransferBackend::transfer`](super::TransferBackend::transfer).
pub type ProgressSender = mpsc::Sender<TransferProgress>;

/// Receiving half drained by the download pipeline.
pub type ProgressReceiver = mpsc::Receiver<TransferProgress>;

/// Creates a bounded progress channel.
#[must_use]
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::channel(PROGRESS_CHANNEL_CAPACITY)
}

/// One observation of an in-flight transfer. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Bytes written so far.
    pub bytes_ready: u64,
    /// Expected size, unknown until response headers are read.
    pub bytes_total: Option<u64>,
    /// Smoothed transfer rate in bytes per second.
    pub rate: f64,
    /// Seconds since the transfer started.
    pub elapsed_secs: f64,
}

impl TransferProgress {
    /// Completion ratio in `0.0..=1.0` when the total is known and non-zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> Option<f64> {
        match self.bytes_total {
            Some(total) if total > 0 => Some((self.bytes_ready as f64 / total as f64).min(1.0)),
            _ => None,
        }
    }
}

/// Tracks elapsed time and rate for one transfer.
#[derive(Debug)]
pub struct ProgressMeter {
    started: Instant,
    last_sample: Instant,
    last_bytes: u64,
    rate: f64,
    total: Option<u64>,
}

impl ProgressMeter {
    /// Starts measuring now.
    #[must_use]
    pub fn start(total: Option<u64>) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_sample: now,
            last_bytes: 0,
            rate: 0.0,
            total,
        }
    }

    /// Records `bytes_ready` and returns the matching snapshot.
    #[allow(clippy::cast_precision_loss)]
    pub fn sample(&mut self, bytes_ready: u64) -> TransferProgress {
        let now = Instant::now();
        let interval = now.duration_since(self.last_sample);
        if interval > Duration::ZERO && bytes_ready >= self.last_bytes {
            let instant_rate = (bytes_ready - self.last_bytes) as f64 / interval.as_secs_f64();
            self.rate = if self.rate == 0.0 {
                instant_rate
            } else {
                RATE_SMOOTHING * instant_rate + (1.0 - RATE_SMOOTHING) * self.rate
            };
            self.last_sample = now;
            self.last_bytes = bytes_ready;
        }

        TransferProgress {
            bytes_ready,
            bytes_total: self.total,
            rate: self.rate,
            elapsed_secs: now.duration_since(self.started).as_secs_f64(),
        }
    }

    /// Final snapshot: the total is pinned to the bytes actually written.
    pub fn finish(&mut self, bytes_ready: u64) -> TransferProgress {
        self.total = Some(bytes_ready);
        self.sample(bytes_ready)
    }
}
