//! Small helpers shared across the feed pipeline and the store.

/// Returns the trimmed-nonempty view of an optional string.
///
/// Feed payloads and metadata documents use empty strings for "no value";
/// those are treated exactly like a missing field.
#[inline]
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Sanitize a string for PostgreSQL by removing null bytes (0x00)
/// which are invalid in UTF-8 text columns
pub fn sanitize_string(s: &str) -> String {
    s.replace('\0', "")
}
