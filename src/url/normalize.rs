use crate::UrlError;
use url::Url;

/// Normalizes a URL for fingerprinting and fetching
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Accept only `http` and `https`
/// 3. Lowercase scheme and host
/// 4. Strip the default port of the scheme (`:80`, `:443`)
/// 5. Resolve dot segments; an empty path becomes `/`
/// 6. Remove the fragment (never sent to the server)
///
/// The query string is kept exactly as given, parameter order included. Two
/// URLs that differ only in parameter order are treated as different pages.
///
/// # Examples
///
/// ```
/// use summit_pipeline::url::normalize_url;
///
/// let url = normalize_url("HTTP://Example.COM:80/a/../b?z=1&a=2#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/b?z=1&a=2");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    // The url crate handles steps 3 to 5 while parsing special schemes
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingHost),
    }

    url.set_fragment(None);

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_scheme_and_host() {
        let result = normalize_url("HTTPS://EXAMPLE.COM/Page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page");
    }

    #[test]
    fn test_strip_default_ports() {
        let http = normalize_url("http://example.com:80/").unwrap();
        assert_eq!(http.as_str(), "http://example.com/");

        let https = normalize_url("https://example.com:443/page").unwrap();
        assert_eq!(https.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_keep_non_default_port() {
        let result = normalize_url("http://example.com:8080/").unwrap();
        assert_eq!(result.as_str(), "http://example.com:8080/");
    }

    #[test]
    fn test_scheme_is_not_upgraded() {
        let result = normalize_url("http://example.com/page").unwrap();
        assert_eq!(result.scheme(), "http");
    }

    #[test]
    fn test_remove_fragment() {
        let result = normalize_url("https://example.com/page#section").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_query_order_preserved() {
        let a = normalize_url("https://example.com/page?b=2&a=1").unwrap();
        let b = normalize_url("https://example.com/page?a=1&b=2").unwrap();
        assert_eq!(a.as_str(), "https://example.com/page?b=2&a=1");
        assert_ne!(a, b);
    }

    #[test]
    fn test_trailing_slash_preserved() {
        let result = normalize_url("https://example.com/dir/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/dir/");
    }

    #[test]
    fn test_dot_segments_resolved() {
        let result = normalize_url("https://example.com/a/../b/./c").unwrap();
        assert_eq!(result.as_str(), "https://example.com/b/c");
    }

    #[test]
    fn test_empty_path_becomes_root() {
        let result = normalize_url("https://example.com").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        let result = normalize_url("  https://example.com/  ").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("ftp://example.com/page");
        assert!(matches!(result.unwrap_err(), UrlError::InvalidScheme(_)));
    }

    #[test]
    fn test_malformed_url() {
        let result = normalize_url("not a url");
        assert!(matches!(result.unwrap_err(), UrlError::Parse(_)));
    }
}
