use url::Url;

/// Extracts the throttling key (lowercase host) from a URL
///
/// Ports are ignored: two services on the same host share one politeness
/// budget.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use summit_pipeline::url::extract_host;
///
/// let url = Url::parse("https://EXAMPLE.COM:8443/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}
