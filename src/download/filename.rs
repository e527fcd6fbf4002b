//! Filename derivation and sanitization for model and preview downloads.
//!
//! Sources, in the order the pipeline consults them: an explicit override on
//! the entry, the URL's last path segment when it carries a real extension,
//! the backend's `Content-Disposition` probe, and the entry identifier.

use std::path::{Component, Path};

use url::Url;

/// Image extensions recognised on preview URLs.
pub const PREVIEW_EXTENSIONS: [&str; 6] = [".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp"];

/// Extension used when the preview URL has no recognised image extension.
pub const DEFAULT_PREVIEW_EXTENSION: &str = ".png";

/// Parses Content-Disposition header to extract filename.
///
/// Handles:
/// - `attachment; filename="example.safetensors"`
/// - `attachment; filename=example.safetensors`
/// - `attachment; filename*=UTF-8''example%20file.safetensors` (RFC 5987)
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    // Try filename*= first (RFC 5987 encoded)
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        // Format: charset'language'encoded_value
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            let encoded_name = encoded[..end].trim().trim_matches('"');
            if let Ok(decoded) = urlencoding::decode(encoded_name)
                && !decoded.is_empty()
            {
                return Some(decoded.into_owned());
            }
        }
    }

    let pos = header.find("filename=")?;
    let value = header[pos + 9..].trim();

    if let Some(stripped) = value.strip_prefix('"') {
        let end = stripped.find('"')?;
        let name = &stripped[..end];
        return (!name.is_empty()).then(|| name.to_string());
    }

    // Unquoted - take until ; or end
    let end = value.find(';').unwrap_or(value.len());
    let name = value[..end].trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Sanitizes a filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |`) and control characters; dot-only names are rewritten
/// so the result always stays inside its directory.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Filename from the URL's last path segment, only when it has a real
/// extension (`model.bin`, not `model`, `model.` or `.hidden`).
#[must_use]
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    let decoded = urlencoding::decode(last).ok()?;

    let dot = decoded.rfind('.')?;
    if dot == 0 || dot + 1 == decoded.len() {
        return None;
    }
    Some(sanitize_filename(&decoded))
}

/// Recognised image extension of a preview URL (lowercase, with dot).
#[must_use]
pub fn preview_extension(url: &str) -> &'static str {
    let path = Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_else(|_| url.to_ascii_lowercase());
    PREVIEW_EXTENSIONS
        .iter()
        .find(|ext| path.ends_with(*ext))
        .copied()
        .unwrap_or(DEFAULT_PREVIEW_EXTENSION)
}

/// Preview filename: the model filename with its extension replaced by the
/// preview URL's image extension.
#[must_use]
pub fn preview_filename(preview_url: &str, model_filename: &str) -> String {
    let extension = preview_extension(preview_url).trim_start_matches('.');
    Path::new(model_filename)
        .with_extension(extension)
        .to_string_lossy()
        .into_owned()
}

/// Validates an entry subdirectory: relative, made of normal components only.
pub(crate) fn is_safe_subdir(subdir: &str) -> bool {
    Path::new(subdir)
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}
