//! MEGA share-link backend.
//!
//! Recognises `mega.nz/file/...` links so they are not handed to the generic
//! HTTP backend (which would save the HTML landing page), but cannot transfer
//! them: MEGA files are end-to-end encrypted with a key carried in the URL
//! fragment.

use async_trait::async_trait;
use url::Url;

use super::{
    BackendPriority, ProgressSender, TransferBackend, TransferError, TransferOutcome,
    TransferRequest,
};

const SHARE_HOST: &str = "mega.nz";

/// Backend that claims MEGA file links and fails loudly.
#[derive(Debug, Clone, Copy, Default)]
pub struct MegaBackend;

impl MegaBackend {
    /// Creates the backend.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransferBackend for MegaBackend {
    fn name(&self) -> &'static str {
        "mega"
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Specialized
    }

    fn accepts(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|u| {
            u.host_str().is_some_and(|h| h.eq_ignore_ascii_case(SHARE_HOST))
                && u.path().starts_with("/file/")
        })
    }

    async fn resolve_filename(&self, _url: &str) -> Result<Option<String>, TransferError> {
        Err(TransferError::not_implemented(self.name(), "resolve_filename"))
    }

    async fn transfer(
        &self,
        _request: TransferRequest<'_>,
        _progress: ProgressSender,
    ) -> Result<TransferOutcome, TransferError> {
        Err(TransferError::not_implemented(self.name(), "transfer"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::progress_channel;
    use std::path::Path;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_accepts_mega_file_links() {
        let backend = MegaBackend::new();
        assert!(backend.accepts("https://mega.nz/file/AbCd#key"));
        assert!(!backend.accepts("https://mega.nz/folder/AbCd#key"));
        assert!(!backend.accepts("https://example.com/file/AbCd"));
    }

    #[tokio::test]
    async fn test_operations_fail_with_not_implemented() {
        let backend = MegaBackend::new();
        let err = backend.resolve_filename("https://mega.nz/file/x").await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::NotImplemented {
                backend: "mega",
                operation: "resolve_filename"
            }
        ));

        let (tx, _rx) = progress_channel();
        let cancel = CancellationToken::new();
        let request = TransferRequest {
            url: "https://mega.nz/file/x",
            destination: Path::new("/nonexistent/never-written"),
            label: "x",
            cancel: &cancel,
        };
        let err = backend.transfer(request, tx).await.unwrap_err();
        assert!(matches!(err, TransferError::NotImplemented { operation: "transfer", .. }));
    }
}
