//! Text helpers for logging and error echoing.

use regex::Regex;
use std::sync::OnceLock;

/// Longest query excerpt written to logs.
pub const QUERY_PREVIEW_CHARS: usize = 80;

/// Cut `s` to at most `max_chars` characters, marking the cut with "...".
///
/// Cuts on character boundaries, so multi-byte UTF-8 input is safe.
pub fn clip(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", s[..idx].trim_end()),
        None => s.to_string(),
    }
}

/// Single-line, clipped form of a query for log fields.
pub fn query_preview(query: &str) -> String {
    let collapsed = query.split_whitespace().collect::<Vec<_>>().join(" ");
    clip(&collapsed, QUERY_PREVIEW_CHARS)
}

fn secret_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"sk-[a-zA-Z0-9_-]{20,}", "sk-***"),
            (r"(?i)(api[_-]?key|apikey)\s*[=:]\s*\S{20,}", "$1=***"),
            (r"(?i)(bearer|token|secret)\s*[=:]?\s*[A-Za-z0-9._~+/-]{16,}=*", "$1 ***"),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
        .collect()
    })
}

/// Mask credentials that upstream error messages sometimes echo back.
pub fn redact_secrets(s: &str) -> String {
    secret_patterns()
        .iter()
        .fold(s.to_string(), |text, (re, replacement)| {
            re.replace_all(&text, *replacement).into_owned()
        })
}
