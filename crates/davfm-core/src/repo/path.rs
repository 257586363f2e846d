//! Path segment handling shared by the repository backends.
//!
//! Backends and the navigation engine exchange absolute, `/`-delimited,
//! percent-decoded paths. These helpers split, join, encode, and decode
//! them. Decoding is lenient: deep-link paths may arrive already decoded
//! or only partially encoded, and a malformed escape falls back to the
//! raw input instead of failing the navigation.

use std::borrow::Cow;

/// Splits a `/`-delimited path into its non-empty segments.
pub fn split_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Joins a directory path and a child name with exactly one separator.
pub fn join_path(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name.trim_start_matches('/'))
}

/// Returns the last non-empty segment of a path, or the path itself when
/// it has none (e.g. `"/"`).
pub fn file_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or(path)
}

/// Percent-encodes one path segment. Unreserved characters
/// (`A-Z a-z 0-9 - . _ ~`) pass through unchanged.
pub fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

/// Percent-encodes every segment of a path, preserving the separators and
/// any leading or trailing slash.
pub fn encode_path(path: &str) -> String {
    let encoded: Vec<String> = path.split('/').map(|s| encode_segment(s)).collect();
    encoded.join("/")
}

/// Leniently percent-decodes one path segment.
///
/// Already-decoded input (including a literal `%` that is not part of a
/// valid escape) is returned unchanged.
pub fn decode_segment_lenient(segment: &str) -> String {
    match urlencoding::decode(segment) {
        Ok(Cow::Borrowed(s)) => s.to_string(),
        Ok(Cow::Owned(s)) => s,
        Err(_) => segment.to_string(),
    }
}

/// Strips the final extension from a path, leaving the rest untouched.
pub fn strip_extension(path: &str) -> &str {
    match file_name(path).rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => {
            let cut = path.len() - (file_name(path).len() - stem.len());
            &path[..cut]
        }
        _ => path,
    }
}
