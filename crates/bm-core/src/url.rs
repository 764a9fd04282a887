//! Hostname extraction utilities
//!
//! These functions avoid a full URL parse and work directly on string slices.
//! Captured policies are keyed by the bare hostname, so everything here is about
//! finding that one component.

// =============================================================================
// Scheme Handling
// =============================================================================

/// Get the position after "://".
#[inline]
pub fn get_scheme_end(url: &str) -> Option<usize> {
    let bytes = url.as_bytes();

    // Find ':'
    let colon_pos = bytes.iter().position(|&b| b == b':')?;

    // The scheme must come before any path or host character
    if colon_pos == 0 || !bytes[..colon_pos].iter().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.')) {
        return None;
    }

    if bytes.len() > colon_pos + 2
        && bytes[colon_pos + 1] == b'/'
        && bytes[colon_pos + 2] == b'/'
    {
        return Some(colon_pos + 3);
    }

    None
}

/// Strip a leading `http://` or `https://` (case-insensitive).
#[inline]
pub fn strip_http_scheme(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 8 && bytes[..8].eq_ignore_ascii_case(b"https://") {
        &s[8..]
    } else if bytes.len() >= 7 && bytes[..7].eq_ignore_ascii_case(b"http://") {
        &s[7..]
    } else {
        s
    }
}

// =============================================================================
// Host Extraction
// =============================================================================

/// Get the start and end positions of the hostname in a URL.
///
/// Userinfo, port, path, query and fragment are all excluded. Bracketed IPv6
/// literals keep their brackets.
#[inline]
pub fn get_host_position(url: &str) -> Option<(usize, usize)> {
    let scheme_end = get_scheme_end(url)?;
    let bytes = url.as_bytes();

    // Authority ends at the first '/', '?' or '#'
    let mut authority_end = bytes.len();
    for (i, &b) in bytes[scheme_end..].iter().enumerate() {
        if b == b'/' || b == b'?' || b == b'#' {
            authority_end = scheme_end + i;
            break;
        }
    }

    // Skip userinfo (last '@' inside the authority)
    let mut host_start = scheme_end;
    if let Some(at_pos) = bytes[scheme_end..authority_end].iter().rposition(|&b| b == b'@') {
        host_start = scheme_end + at_pos + 1;
    }

    let host_end = if bytes.get(host_start) == Some(&b'[') {
        let close = bytes[host_start..authority_end].iter().position(|&b| b == b']')?;
        host_start + close + 1
    } else {
        bytes[host_start..authority_end]
            .iter()
            .position(|&b| b == b':')
            .map_or(authority_end, |p| host_start + p)
    };

    if host_end == host_start {
        return None;
    }

    Some((host_start, host_end))
}

/// Fast host extraction without allocations.
/// Returns a slice into the original URL.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    let (host_start, host_end) = get_host_position(url)?;
    Some(&url[host_start..host_end])
}

/// Hostname as the browser reports it: lower-cased, no trailing dot.
pub fn hostname(url: &str) -> Option<String> {
    let host = extract_host(url)?.trim_end_matches('.');
    if host.is_empty() {
        return None;
    }
    Some(host.to_ascii_lowercase())
}
