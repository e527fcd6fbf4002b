//! Constants shared by the transfer backends (timeouts, probe sizes).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes between body reads for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default bound for filename probe requests.
pub const PROBE_TIMEOUT_SECS: u64 = 10;

/// Byte range requested when probing for a remote filename.
pub const PROBE_RANGE: &str = "bytes=0-1";

/// Host that expects the API token as a `token` query parameter.
pub const TOKEN_QUERY_HOST: &str = "civitai.com";
