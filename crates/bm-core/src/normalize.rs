//! Wildcard normalizer for CSP source expressions
//!
//! Turns the tokens of a directive value into strings that can be found inside
//! dataset rows. A wildcard host such as `https://*.cdn.example.com` becomes the
//! suffix `.cdn.example.com`; keywords such as `'self'` carry no host and are
//! dropped.
//!
//! # Examples
//!
//! ```
//! use bm_core::normalize::normalize_directive;
//!
//! assert_eq!(
//!     normalize_directive("'self' https://*.example.com cdn.example.net"),
//!     vec![".example.com", "cdn.example.net"],
//! );
//! ```

use std::collections::HashSet;

use crate::url::strip_http_scheme;

/// Normalize one source expression.
///
/// Returns `None` for tokens with neither `*` nor `.`.
pub fn normalize_source(token: &str) -> Option<String> {
    if !token.contains('*') {
        return token.contains('.').then(|| token.to_string());
    }

    // Keep only what follows the last wildcard; with several wildcards the
    // fragment between the last two is kept as well.
    let host = strip_http_scheme(token);
    let segments: Vec<&str> = host.split('*').collect();
    let tail = segments[segments.len().saturating_sub(2)..].concat();

    if tail.starts_with('.') {
        Some(tail)
    } else {
        Some(format!(".{}", tail))
    }
}

/// Normalize every whitespace-separated token of a directive value.
/// Duplicates are removed, first-seen order is kept.
pub fn normalize_directive(value: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();

    for token in value.split_whitespace().filter_map(normalize_source) {
        if seen.insert(token.clone()) {
            tokens.push(token);
        }
    }

    tokens
}
