//! User-Agent string sent by every backend HTTP client.

/// Project URL for User-Agent identification (RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/model-organizer";

/// Default User-Agent for transfer and probe requests.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("model-organizer/{version} (+{PROJECT_UA_URL})")
}
