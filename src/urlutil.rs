//! URL helper predicates and href normalization used throughout the crawler.

use url::Url;

/// Href prefixes that must never be resolved against the base URL.
pub const OPAQUE_HREF_PREFIXES: &[&str] = &["file:", "mailto:", "tel:", "javascript:", "#", "data:"];

/// Checks whether `href` is an absolute URL (non-empty scheme and host).
///
/// `https://example.com/query` -> true, `/query` -> false.
pub fn is_absolute_url(href: &str) -> bool {
    match Url::parse(href) {
        Ok(parsed) => !parsed.scheme().is_empty() && parsed.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

/// Tells if the scheme is one the crawler supports.
pub fn is_valid_scheme(scheme: &str) -> bool {
    matches!(scheme, "http" | "https")
}

/// Checks whether `s` begins with any of `prefixes`. Empty prefixes never match.
pub fn begins_with_any(s: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| !p.is_empty() && s.starts_with(p))
}

/// Checks whether `s` contains any of `needles`. Empty needles never match.
pub fn contains_any(s: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| !n.is_empty() && s.contains(n.as_str()))
}

/// Normalizes a raw href into the canonical lowercase form used for queue
/// membership.
///
/// Surrounding whitespace is trimmed and a single trailing `/` dropped.
/// A relative href (not absolute, not opaque-prefixed) gets a leading `/`
/// when missing and the base URL prepended. Returns `None` for empty hrefs.
pub fn normalize_href(href: &str, base_url: &str) -> Option<String> {
    let mut href = href.trim().trim_end_matches('/').to_string();
    if href.is_empty() {
        return None;
    }
    if !is_absolute_url(&href) && !begins_with_any(&href, OPAQUE_HREF_PREFIXES) {
        if !href.starts_with('/') {
            href.insert(0, '/');
        }
        href = format!("{}{}", base_url, href);
    }
    Some(href.to_lowercase())
}

/// Parses a base URL into its canonical form: trimmed, a single trailing
/// `/` dropped, lowercased. Returns the parsed URL (for host/scheme
/// checks) alongside the canonical string (for membership and joining).
pub fn parse_base_url(raw: &str) -> Result<(Url, String), url::ParseError> {
    let canonical = raw.trim().trim_end_matches('/').to_lowercase();
    let parsed = Url::parse(&canonical)?;
    Ok((parsed, canonical))
}
