// src/utils/url.rs

//! URL canonicalization and posting fingerprints.

use sha2::{Digest, Sha256};
use url::Url;

/// Canonical form of a posting URL.
///
/// Keeps scheme, host and path only: query and fragment are dropped, the
/// host is lowercased without a `www.` prefix, default ports vanish and the
/// trailing slash is removed.
///
/// # Examples
/// ```
/// use jobwatch::utils::url::canonical_url;
///
/// assert_eq!(
///     canonical_url("https://WWW.Example.com/jobs/42/?utm_source=x").as_deref(),
///     Some("https://example.com/jobs/42")
/// );
/// ```
pub fn canonical_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = Url::parse(trimmed).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let port = parsed
        .port()
        .map(|p| format!(":{p}"))
        .unwrap_or_default();

    let path = parsed.path().trim_end_matches('/');

    Some(format!("{}://{}{}{}", parsed.scheme(), host, port, path))
}

/// Stable dedup key for a posting URL.
///
/// Returns the hex SHA-256 of [`canonical_url`], or `None` when the URL is
/// empty or unparseable.
pub fn fingerprint(raw: &str) -> Option<String> {
    let canonical = canonical_url(raw)?;
    Some(fingerprint_canonical(&canonical))
}

/// Hash an already canonical URL.
pub fn fingerprint_canonical(canonical: &str) -> String {
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_strips_query_and_fragment() {
        assert_eq!(
            canonical_url("https://acme.gupy.io/job/123?jobBoardSource=gupy_portal#apply"),
            Some("https://acme.gupy.io/job/123".to_string())
        );
    }

    #[test]
    fn test_canonical_trailing_slash() {
        assert_eq!(
            canonical_url("https://jobs.lever.co/acme/abc/"),
            canonical_url("https://jobs.lever.co/acme/abc")
        );
    }

    #[test]
    fn test_canonical_host_case_and_www() {
        assert_eq!(
            canonical_url("https://WWW.Boards.Greenhouse.io/acme/jobs/1"),
            Some("https://boards.greenhouse.io/acme/jobs/1".to_string())
        );
    }

    #[test]
    fn test_canonical_default_port_dropped() {
        assert_eq!(
            canonical_url("https://example.com:443/a"),
            Some("https://example.com/a".to_string())
        );
        assert_eq!(
            canonical_url("http://example.com:8080/a"),
            Some("http://example.com:8080/a".to_string())
        );
    }

    #[test]
    fn test_canonical_rejects_empty_and_relative() {
        assert_eq!(canonical_url("   "), None);
        assert_eq!(canonical_url("/job/1"), None);
    }

    #[test]
    fn test_fingerprint_stable_across_sources() {
        let from_gupy = fingerprint("https://acme.gupy.io/job/77?jobBoardSource=gupy_portal");
        let from_file = fingerprint("https://ACME.gupy.io/job/77/");
        assert!(from_gupy.is_some());
        assert_eq!(from_gupy, from_file);
        assert_eq!(from_gupy.as_ref().map(|f| f.len()), Some(64));
    }

    #[test]
    fn test_fingerprint_distinguishes_paths() {
        assert_ne!(
            fingerprint("https://acme.gupy.io/job/1"),
            fingerprint("https://acme.gupy.io/job/2")
        );
    }
}
