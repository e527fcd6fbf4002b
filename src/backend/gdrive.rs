//! Google Drive share-link backend.
//!
//! Share links (`/file/d/<id>/view`) are rewritten to the `uc?id=` download
//! endpoint. Large files answer with an HTML confirmation page instead of the
//! file; the real download link is scraped from it and followed with the same
//! cookie-carrying client.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};
use url::Url;

use super::client::{build_client, check_status, stream_to_file};
use super::{
    BackendPriority, ClientOptions, ProgressSender, TransferBackend, TransferError,
    TransferOutcome, TransferRequest,
};
use crate::download::filename::parse_content_disposition;

const SERVICE: &str = "Google Drive";
const SHARE_HOST: &str = "drive.google.com";
const DEFAULT_BASE_URL: &str = "https://drive.google.com/";
const DEFAULT_DOCS_URL: &str = "https://docs.google.com";

/// Confirmation pages followed before giving up.
const MAX_CONFIRMATION_HOPS: usize = 3;

const NO_PUBLIC_LINK: &str = "Cannot retrieve the public link of the file. \
     You may need to change the permission to 'Anyone with the link', or have had many accesses.";

#[allow(clippy::expect_used)]
static FILE_PATH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/file/(?:u/\d+/)?d/([^/]+)").expect("file path regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static EXPORT_HREF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="(/uc\?export=download[^"]+)"#).expect("export href regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static DOWNLOAD_FORM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"id="download-form" action="(.+?)""#).expect("download form regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static HIDDEN_INPUT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<input type="hidden" name="([^"]+)" value="([^"]*)""#)
        .expect("hidden input regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static DOWNLOAD_URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""downloadUrl":"([^"]+)"#).expect("downloadUrl regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static ERROR_CAPTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<p class="uc-error-subcaption">(.*)</p>"#).expect("error caption regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static NAME_SIZE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"class="uc-name-size"><a[^>]*>([^<]+)</a>"#).expect("name size regex is valid") // Static pattern, safe to panic
});

/// Backend for `drive.google.com/file/...` share links.
#[derive(Debug, Clone)]
pub struct GDriveBackend {
    client: Client,
    base_url: Url,
    docs_url: String,
    probe_timeout: Duration,
}

impl GDriveBackend {
    /// Creates the backend against the public Drive endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Client`] if the HTTP client cannot be built.
    pub fn new(options: &ClientOptions) -> Result<Self, TransferError> {
        Self::with_endpoints(options, DEFAULT_BASE_URL, DEFAULT_DOCS_URL)
    }

    /// Creates the backend against custom endpoints (used by tests).
    ///
    /// `base_url` serves `uc` and `open`; `docs_url` prefixes relative
    /// confirmation links.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidUrl`] if `base_url` does not parse, or
    /// [`TransferError::Client`] if the HTTP client cannot be built.
    pub fn with_endpoints(
        options: &ClientOptions,
        base_url: &str,
        docs_url: &str,
    ) -> Result<Self, TransferError> {
        let mut base = Url::parse(base_url).map_err(|_| TransferError::invalid_url(base_url))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client: build_client(options, true)?,
            base_url: base,
            docs_url: docs_url.trim_end_matches('/').to_string(),
            probe_timeout: options.probe_timeout,
        })
    }

    fn endpoint(&self, name: &str, file_id: &str) -> Result<Url, TransferError> {
        let mut url = self
            .base_url
            .join(name)
            .map_err(|_| TransferError::invalid_url(self.base_url.as_str()))?;
        url.query_pairs_mut().append_pair("id", file_id);
        Ok(url)
    }
}

/// Extracts the Drive file id from a share link.
pub(crate) fn file_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if let Some((_, id)) = parsed.query_pairs().find(|(key, _)| key == "id") {
        return (!id.is_empty()).then(|| id.into_owned());
    }
    FILE_PATH_PATTERN
        .captures(parsed.path())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Finds the real download link on a confirmation page.
///
/// Returns the page's error caption (or a generic access message) when no
/// link is present.
pub(crate) fn confirmation_url(page: &str, docs_url: &str) -> Result<String, String> {
    for line in page.lines() {
        if let Some(caps) = EXPORT_HREF_PATTERN.captures(line) {
            return Ok(format!("{docs_url}{}", caps[1].replace("&amp;", "&")));
        }
        if let Some(caps) = DOWNLOAD_FORM_PATTERN.captures(line) {
            let action = caps[1].replace("&amp;", "&");
            return Ok(with_hidden_inputs(&action, page));
        }
        if let Some(caps) = DOWNLOAD_URL_PATTERN.captures(line) {
            return Ok(caps[1].replace("\\u003d", "=").replace("\\u0026", "&"));
        }
        if let Some(caps) = ERROR_CAPTION_PATTERN.captures(line) {
            return Err(caps[1].trim().to_string());
        }
    }
    Err(NO_PUBLIC_LINK.to_string())
}

fn with_hidden_inputs(action: &str, page: &str) -> String {
    let Ok(mut url) = Url::parse(action) else {
        return action.to_string();
    };
    {
        let mut pairs = url.query_pairs_mut();
        for caps in HIDDEN_INPUT_PATTERN.captures_iter(page) {
            pairs.append_pair(&caps[1], &caps[2]);
        }
    }
    url.into()
}

/// File name shown on a confirmation page.
pub(crate) fn name_from_page(page: &str) -> Option<String> {
    NAME_SIZE_PATTERN
        .captures(page)
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| name.contains('.'))
}

#[async_trait]
impl TransferBackend for GDriveBackend {
    fn name(&self) -> &'static str {
        "gdrive"
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Specialized
    }

    fn accepts(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|u| {
            u.host_str().is_some_and(|h| h.eq_ignore_ascii_case(SHARE_HOST))
                && u.path().contains("/file/")
        })
    }

    #[instrument(skip(self), fields(url = %url))]
    async fn resolve_filename(&self, url: &str) -> Result<Option<String>, TransferError> {
        let Some(id) = file_id(url) else {
            return Ok(None);
        };
        // The per-request timeout also bounds reading the confirmation page.
        let response = match self
            .client
            .get(self.endpoint("uc", &id)?)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                warn!(error = %error, "Drive filename probe failed");
                return Ok(None);
            }
        };
        if response.status() != StatusCode::OK {
            return Ok(None);
        }

        if let Some(name) = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_disposition)
        {
            return Ok(Some(name.replace('/', "_")));
        }

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/html"));
        if !is_html {
            return Ok(None);
        }
        Ok(response.text().await.ok().as_deref().and_then(name_from_page))
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

        let id = file_id(request.url).ok_or_else(|| TransferError::invalid_url(request.url))?;
        let origin = self.endpoint("uc", &id)?;
        let mut current = origin.clone();
        let mut hops = 0;

        let response = loop {
            if request.cancel.is_cancelled() {
                return Ok(TransferOutcome::Cancelled);
            }

            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| TransferError::network(request.url, e))?;

            // Docs and spreadsheets answer 500 on `uc`; `open` serves them.
            if current == origin && response.status() == StatusCode::INTERNAL_SERVER_ERROR {
                debug!("uc endpoint returned 500; retrying via open");
                current = self.endpoint("open", &id)?;
                continue;
            }

            let response = check_status(response, request.url)?;
            if response.headers().contains_key(CONTENT_DISPOSITION) {
                break response;
            }

            hops += 1;
            if hops > MAX_CONFIRMATION_HOPS {
                return Err(TransferError::remote(
                    SERVICE,
                    request.url,
                    "too many confirmation pages",
                ));
            }

            let page = response
                .text()
                .await
                .map_err(|e| TransferError::network(request.url, e))?;
            let next = confirmation_url(&page, &self.docs_url).map_err(|message| {
                TransferError::remote(SERVICE, request.url, format!("access denied: {message}"))
            })?;
            debug!(next = %next, "following confirmation link");
            current = Url::parse(&next).map_err(|_| TransferError::invalid_url(next.clone()))?;
        };

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
