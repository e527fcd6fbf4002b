//! Shared HTTP plumbing for the backends: client construction, status
//! mapping and streaming a response body into the transfer target.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, RequestBuilder, Response};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, PROBE_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::TransferError;
use super::progress::{ProgressMeter, ProgressSender, TransferProgress};
use super::TransferOutcome;
use crate::user_agent;

/// Network settings shared by every backend in a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Bearer token sent with HTTP downloads.
    pub api_token: Option<String>,
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Maximum idle time between body reads.
    pub read_timeout: Duration,
    /// Total time allowed for a filename probe.
    pub probe_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_token: None,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            probe_timeout: Duration::from_secs(PROBE_TIMEOUT_SECS),
        }
    }
}

impl ClientOptions {
    /// Returns the configured token, ignoring blank values.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.api_token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// Builds a reqwest client with the configured timeouts.
///
/// `cookie_store` keeps session cookies between requests, which share-link
/// confirmation flows depend on.
///
/// # Errors
///
/// Returns [`TransferError::Client`] if the TLS backend cannot be initialised.
pub(crate) fn build_client(
    options: &ClientOptions,
    cookie_store: bool,
) -> Result<Client, TransferError> {
    Client::builder()
        .connect_timeout(options.connect_timeout)
        .read_timeout(options.read_timeout)
        .gzip(true)
        .cookie_store(cookie_store)
        .user_agent(user_agent::default_user_agent())
        .build()
        .map_err(TransferError::Client)
}

/// Sends `request` and maps transport failures and non-2xx statuses.
pub(crate) async fn send_checked(
    request: RequestBuilder,
    url: &str,
) -> Result<Response, TransferError> {
    let response = request
        .send()
        .await
        .map_err(|e| TransferError::network(url, e))?;
    check_status(response, url)
}

/// Promotes auth-related status codes to [`TransferError::AuthRequired`].
pub(crate) fn check_status(response: Response, url: &str) -> Result<Response, TransferError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let status_code = status.as_u16();
    if matches!(status_code, 401 | 403 | 407) {
        return Err(TransferError::auth_required(url, status_code, host_of(url)));
    }
    Err(TransferError::http_status(url, status_code))
}

/// Lowercase host of `url`, or the raw string if it does not parse.
pub(crate) fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .unwrap_or_else(|| url.to_string())
}

pub(crate) async fn emit(progress: &ProgressSender, snapshot: TransferProgress) {
    if progress.send(snapshot).await.is_err() {
        debug!("progress receiver dropped; snapshot discarded");
    }
}

/// Streams the response body into `destination`, emitting a snapshot after
/// headers, one per chunk and a final one whose total equals the bytes written.
///
/// Returns [`TransferOutcome::Cancelled`] as soon as `cancel` fires; the
/// partially written file is left for the caller to discard.
pub(crate) async fn stream_to_file(
    response: Response,
    url: &str,
    destination: &Path,
    cancel: &CancellationToken,
    progress: &ProgressSender,
) -> Result<TransferOutcome, TransferError> {
    let total = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let mut meter = ProgressMeter::start(total);
    emit(progress, meter.sample(0)).await;

    if cancel.is_cancelled() {
        return Ok(TransferOutcome::Cancelled);
    }

    let file = File::create(destination)
        .await
        .map_err(|e| TransferError::io(destination, e))?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(bytes = bytes_written, "transfer cancelled mid-stream");
                return Ok(TransferOutcome::Cancelled);
            }
            next = stream.next() => next,
        };
        let Some(chunk_result) = next else { break };
        let chunk = chunk_result.map_err(|e| TransferError::network(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| TransferError::io(destination, e))?;
        bytes_written += chunk.len() as u64;

        emit(progress, meter.sample(bytes_written)).await;
    }

    // Ensure all data is flushed to disk
    writer
        .flush()
        .await
        .map_err(|e| TransferError::io(destination, e))?;

    emit(progress, meter.finish(bytes_written)).await;
    info!(path = %destination.display(), bytes = bytes_written, "transfer complete");

    Ok(TransferOutcome::Completed {
        bytes: bytes_written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_token_ignores_blank() {
        let mut options = ClientOptions::default();
        assert_eq!(options.token(), None);
        options.api_token = Some("   ".into());
        assert_eq!(options.token(), None);
        options.api_token = Some(" abc ".into());
        assert_eq!(options.token(), Some("abc"));
    }

    #[test]
    fn test_default_timeouts() {
        let options = ClientOptions::default();
        assert_eq!(options.connect_timeout, Duration::from_secs(30));
        assert_eq!(options.read_timeout, Duration::from_secs(300));
        assert_eq!(options.probe_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_host_of_lowercases() {
        assert_eq!(host_of("https://CivitAI.com/api/download/1"), "civitai.com");
        assert_eq!(host_of("not a url"), "not a url");
    }

    #[test]
    fn test_build_client_succeeds_with_defaults() {
        assert!(build_client(&ClientOptions::default(), true).is_ok());
    }
}
