//! Generic HTTP(S) backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION, RANGE};
use reqwest::{Client, RequestBuilder};
use tracing::{debug, instrument};
use url::Url;

use super::client::{build_client, send_checked, stream_to_file};
use super::constants::{PROBE_RANGE, TOKEN_QUERY_HOST};
use super::{
    BackendPriority, ClientOptions, ProgressSender, TransferBackend, TransferError,
    TransferOutcome, TransferRequest,
};
use crate::download::filename::parse_content_disposition;

/// Catch-all backend for any `http`/`https` URL.
///
/// Sends the configured API token as a bearer header and, for the model
/// hosting site that expects it, as a `token` query parameter too.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    api_token: Option<String>,
    probe_timeout: Duration,
}

impl HttpBackend {
    /// Creates the backend with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Client`] if the HTTP client cannot be built.
    pub fn new(options: &ClientOptions) -> Result<Self, TransferError> {
        Ok(Self {
            client: build_client(options, false)?,
            api_token: options.token().map(ToString::to_string),
            probe_timeout: options.probe_timeout,
        })
    }

    /// URL actually requested: adds `token=` for hosts using query auth.
    fn request_url(&self, url: &str) -> Result<Url, TransferError> {
        let mut parsed = Url::parse(url).map_err(|_| TransferError::invalid_url(url))?;
        if let Some(token) = self.api_token.as_deref()
            && parsed
                .host_str()
                .is_some_and(|h| h.eq_ignore_ascii_case(TOKEN_QUERY_HOST))
        {
            parsed.query_pairs_mut().append_pair("token", token);
        }
        Ok(parsed)
    }

    fn get(&self, url: Url) -> RequestBuilder {
        let request = self.client.get(url);
        match self.api_token.as_deref() {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }
}

#[async_trait]
impl TransferBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Fallback
    }

    fn accepts(&self, url: &str) -> bool {
        Url::parse(url)
            .is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
    }

    #[instrument(skip(self), fields(url = %url))]
    async fn resolve_filename(&self, url: &str) -> Result<Option<String>, TransferError> {
        let Ok(request_url) = self.request_url(url) else {
            return Ok(None);
        };

        let response = self
            .get(request_url)
            .header(RANGE, PROBE_RANGE)
            .timeout(self.probe_timeout)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                debug!(error = %error, "filename probe failed");
                return Ok(None);
            }
        };

        if !matches!(response.status().as_u16(), 200 | 206) {
            debug!(status = response.status().as_u16(), "filename probe rejected");
            return Ok(None);
        }

        Ok(response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_disposition))
    }

    #[instrument(skip(self, request, progress), fields(url = %request.url, label = %request.label))]
    async fn transfer(
        &self,
        request: TransferRequest<'_>,
        progress: ProgressSender,
    ) -> Result<TransferOutcome, TransferError> {
        if request.cancel.is_cancelled() {
            return Ok(TransferOutcome::Cancelled);
        }

        let request_url = self.request_url(request.url)?;
        let response = send_checked(self.get(request_url), request.url).await?;

        if request.cancel.is_cancelled() {
            return Ok(TransferOutcome::Cancelled);
        }

        stream_to_file(
            response,
            request.url,
            request.destination,
            request.cancel,
            &progress,
        )
        .await
    }
}
