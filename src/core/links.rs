//! URL canonicalization and domain extraction.
//!
//! Two URLs are the same source when their canonical forms are equal. The
//! canonical form drops the scheme, a leading `www.`, the query string, the
//! fragment and any trailing slash, and lowercases what remains.

use url::Url;

/// Returns the canonical form of `raw`.
///
/// Unparseable input is normalized textually with the same rules so that
/// provider output with odd URLs still dedups consistently.
#[must_use]
pub fn canonicalize_url(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(parsed) = Url::parse(raw)
        && let Some(host) = parsed.host_str()
    {
        let host = host.trim_start_matches("www.").to_lowercase();
        let port = parsed.port().map_or_else(String::new, |p| format!(":{p}"));
        let path = parsed.path().trim_end_matches('/').to_lowercase();
        return format!("{host}{port}{path}");
    }

    let lowered = raw.to_lowercase();
    let without_scheme = lowered
        .split_once("://")
        .map_or(lowered.as_str(), |(_, rest)| rest);
    let without_query = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    without_query
        .trim_start_matches("www.")
        .trim_end_matches('/')
        .to_string()
}

/// Returns the lowercase host of `raw` without a leading `www.`.
#[must_use]
pub fn domain_of(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    let host = parsed.host_str()?;
    let host = host.trim_start_matches("www.").to_lowercase();
    if host.is_empty() { None } else { Some(host) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_ignores_case_query_and_fragment() {
        let a = canonicalize_url("https://Example.com/Docs/Page?utm_source=x#intro");
        let b = canonicalize_url("http://www.example.com/docs/page/");
        assert_eq!(a, "example.com/docs/page");
        assert_eq!(a, b);
    }

    #[test]
    fn test_canonical_keeps_port() {
        assert_eq!(
            canonicalize_url("http://localhost:8080/api/"),
            "localhost:8080/api"
        );
    }

    #[test]
    fn test_canonical_root() {
        assert_eq!(canonicalize_url("https://www.rust-lang.org/"), "rust-lang.org");
    }

    #[test]
    fn test_canonical_unparseable() {
        assert_eq!(canonicalize_url("WWW.Example.com/A?b=1"), "example.com/a");
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(
            domain_of("https://www.Wikipedia.org/wiki/Rust"),
            Some("wikipedia.org".to_string())
        );
        assert_eq!(domain_of("not a url"), None);
    }
}
