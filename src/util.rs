//! Shared utility functions.

use axum::http::HeaderMap;

/// Split an uploaded blob of keys into individual values.
///
/// One key per line; surrounding whitespace is trimmed and blank lines are
/// dropped. Duplicates are kept so the store can report them as skipped.
pub fn parse_key_blob(blob: &str) -> Vec<String> {
    blob.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Extract a Bearer token from the Authorization header.
///
/// Returns the token string without the "Bearer " prefix, or None if
/// the header is missing, malformed, or empty after the prefix.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}
