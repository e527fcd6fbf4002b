//! In-process transfer backends for orchestration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use organizer_core::backend::{
    BackendPriority, ProgressSender, TransferBackend, TransferError, TransferOutcome,
    TransferProgress, TransferRequest,
};
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;

/// Serves `test://` URLs from a fixed body and counts calls.
#[derive(Debug, Default)]
pub struct StaticBackend {
    pub body: Vec<u8>,
    pub probe_name: Option<String>,
    pub transfers: AtomicUsize,
    pub probes: AtomicUsize,
}

impl StaticBackend {
    pub fn new(body: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            body: body.to_vec(),
            ..Self::default()
        })
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransferBackend for StaticBackend {
    fn name(&self) -> &'static str {
        "static"
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Specialized
    }

    fn accepts(&self, url: &str) -> bool {
        url.starts_with("test://")
    }

    async fn resolve_filename(&self, _url: &str) -> Result<Option<String>, TransferError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(self.probe_name.clone())
    }

    async fn transfer(
        &self,
        request: TransferRequest<'_>,
        progress: ProgressSender,
    ) -> Result<TransferOutcome, TransferError> {
        self.transfers.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(request.destination, &self.body)
            .await
            .map_err(|e| TransferError::io(request.destination, e))?;
        let bytes = self.body.len() as u64;
        let _ = progress
            .send(TransferProgress {
                bytes_ready: bytes,
                bytes_total: Some(bytes),
                ..TransferProgress::default()
            })
            .await;
        Ok(TransferOutcome::Completed { bytes })
    }
}

/// Serves `slow://` URLs: writes a first chunk, signals `started`, then
/// holds the transfer open until the run is cancelled.
#[derive(Debug, Default)]
pub struct BlockingBackend {
    pub started: Notify,
    pub transfers: AtomicUsize,
}

impl BlockingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl TransferBackend for BlockingBackend {
    fn name(&self) -> &'static str {
        "blocking"
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Specialized
    }

    fn accepts(&self, url: &str) -> bool {
        url.starts_with("slow://")
    }

    async fn resolve_filename(&self, _url: &str) -> Result<Option<String>, TransferError> {
        Ok(None)
    }

    async fn transfer(
        &self,
        request: TransferRequest<'_>,
        progress: ProgressSender,
    ) -> Result<TransferOutcome, TransferError> {
        self.transfers.fetch_add(1, Ordering::SeqCst);
        let mut file = tokio::fs::File::create(request.destination)
            .await
            .map_err(|e| TransferError::io(request.destination, e))?;
        file.write_all(b"partial")
            .await
            .map_err(|e| TransferError::io(request.destination, e))?;
        let _ = progress
            .send(TransferProgress {
                bytes_ready: 7,
                bytes_total: Some(1_000),
                ..TransferProgress::default()
            })
            .await;

        self.started.notify_one();
        request.cancel.cancelled().await;
        Ok(TransferOutcome::Cancelled)
    }
}
