//! Error types for transfer backends.
//!
//! Each variant carries the URL or path it concerns so captured per-entry
//! errors stay readable after the batch finished.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a [`TransferBackend`](super::TransferBackend).
#[derive(Debug, Error)]
pub enum TransferError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The server refused the request without valid credentials.
    #[error("authentication required for {domain} (HTTP {status}) downloading {url}\n  Suggestion: {suggestion}")]
    AuthRequired {
        /// The URL that requires authentication.
        url: String,
        /// The HTTP status code (401, 403 or 407).
        status: u16,
        /// The domain requiring authentication.
        domain: String,
        /// User-facing hint for resolving the problem.
        suggestion: &'static str,
    },

    /// File system error while writing the transfer target.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The URL is malformed or lacks the parts the backend needs.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
    },

    /// The remote service reported a failure in its response body.
    #[error("{service} refused {url}: {message}")]
    Remote {
        /// Service name, e.g. `Google Drive`.
        service: &'static str,
        /// The URL being transferred.
        url: String,
        /// Message extracted from the service response.
        message: String,
    },

    /// The backend recognises the URL but cannot perform the operation.
    #[error("{backend} backend does not implement {operation}")]
    NotImplemented {
        /// Backend name.
        backend: &'static str,
        /// Operation that was requested.
        operation: &'static str,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl TransferError {
    /// Creates a network error from a reqwest error, promoting timeouts.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an authentication-required error.
    ///
    /// 407 suggests proxy configuration; every other status points at the
    /// API key setting.
    pub fn auth_required(url: impl Into<String>, status: u16, domain: impl Into<String>) -> Self {
        let suggestion = if status == 407 {
            "Configure your HTTP proxy settings or check proxy credentials."
        } else {
            "Check the API key (--api-key, MODEL_ORGANIZER_API_KEY or `api_key` in the config file)."
        };
        Self::AuthRequired {
            url: url.into(),
            status,
            domain: domain.into(),
            suggestion,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a service-reported failure.
    pub fn remote(service: &'static str, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            service,
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a not-implemented error.
    pub fn not_implemented(backend: &'static str, operation: &'static str) -> Self {
        Self::NotImplemented { backend, operation }
    }

    /// Short variant name used when the error is captured into batch state.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network { .. } => "NetworkError",
            Self::Timeout { .. } => "TimeoutError",
            Self::HttpStatus { .. } => "HttpStatusError",
            Self::AuthRequired { .. } => "AuthRequiredError",
            Self::Io { .. } => "IoError",
            Self::InvalidUrl { .. } => "InvalidUrlError",
            Self::Remote { .. } => "RemoteError",
            Self::NotImplemented { .. } => "NotImplementedError",
            Self::Client(_) => "ClientError",
        }
    }
}

// Variants need a URL or path the source errors don't carry, so there are no
// `From<reqwest::Error>` / `From<std::io::Error>` impls; use the constructors.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display_includes_url_and_code() {
        let msg = TransferError::http_status("https://example.com/m.bin", 404).to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(msg.contains("https://example.com/m.bin"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_auth_required_suggestion_depends_on_status() {
        let proxy = TransferError::auth_required("https://example.com", 407, "example.com");
        assert!(proxy.to_string().contains("proxy"));

        let key = TransferError::auth_required("https://civitai.com/x", 401, "civitai.com");
        let msg = key.to_string();
        assert!(msg.contains("API key"), "Expected API key hint in: {msg}");
        assert!(msg.contains("civitai.com"));
    }

    #[test]
    fn test_not_implemented_names_backend_and_operation() {
        let err = TransferError::not_implemented("mega", "transfer");
        assert_eq!(err.to_string(), "mega backend does not implement transfer");
        assert_eq!(err.kind(), "NotImplementedError");
    }

    #[test]
    fn test_io_display_includes_path() {
        let err = TransferError::io(
            "/models/m.bin",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/models/m.bin"));
        assert_eq!(err.kind(), "IoError");
    }

    #[test]
    fn test_remote_display() {
        let err = TransferError::remote("Google Drive", "https://drive.google.com/x", "quota exceeded");
        assert_eq!(
            err.to_string(),
            "Google Drive refused https://drive.google.com/x: quota exceeded"
        );
    }
}
