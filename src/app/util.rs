//! Text helpers shared by collaborators and the core
//!
//! Small pure functions for the string munging every site-specific parser
//! ends up doing: URL decoding, resolution labels, title cleanup and header
//! value sanitizing.

use std::sync::OnceLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use url::Url;

use crate::app::models::UNKNOWN_QUALITY;

fn resolution_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"([\d ]{2,5}x[\d ]{2,5})").expect("Resolution pattern should be valid")
    })
}

/// Decode a percent-encoded (form style) string
///
/// `+` becomes a space. Malformed escapes are kept verbatim.
pub fn decode_url(text: &str) -> String {
    let spaced = text.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Resolution such as `1280x720` embedded in a media URL, `--` if absent
pub fn resolution_from_url(url: &str) -> String {
    resolution_pattern()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_QUALITY.to_string())
}

/// Strip newlines, tabs and dots from a title so it can name a file
pub fn filter_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| !matches!(c, '\n' | '\t' | '.'))
        .collect()
}

/// Keep only characters a header value can carry
///
/// Quotes are dropped as well; the result is visible ASCII and tabs.
pub fn sanitize_header_value(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c == '\t' || (' '..='~').contains(c))
        .filter(|c| !matches!(c, '\'' | '"'))
        .collect()
}

/// Resolve a reference found in a document against the document URL
///
/// Absolute `http(s)` references are returned unchanged; anything else is
/// joined against `base`.
pub fn join_url(base: &Url, reference: &str) -> Option<String> {
    let lower = reference.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Some(reference.to_string());
    }
    base.join(reference).ok().map(|u| u.to_string())
}
