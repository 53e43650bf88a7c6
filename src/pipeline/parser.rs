//! HTML processor
//!
//! Extracts structural data from collected HTML:
//! - Page title and meta description
//! - Headings (h1 to h6) in document order
//! - Links (from <a> tags and canonical links)
//! - Visible word count
//!
//! No scoring happens here; that is the analyzer's job.

use crate::config::Config;
use crate::pipeline::collaborators::{CollectionResult, Heading, ProcessedData, Processor, ProcessingError};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Processor that parses HTML with `scraper`
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlProcessor;

impl Processor for HtmlProcessor {
    fn process(
        &self,
        input: &CollectionResult,
        _config: &Config,
    ) -> Result<ProcessedData, ProcessingError> {
        if let Some(content_type) = &input.content_type {
            if !content_type.contains("html") {
                return Err(ProcessingError::new(format!(
                    "Unsupported content type: {}",
                    content_type
                )));
            }
        }

        let base_url = Url::parse(&input.final_url)
            .or_else(|_| Url::parse(&input.url))
            .map_err(|e| ProcessingError::new(format!("Invalid base URL: {}", e)))?;

        Ok(parse_html(&input.body, &input.url, &base_url))
    }
}

/// Parses HTML content and extracts structural data
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs and fragment-only links
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `url` - The URL the content was collected for
/// * `base_url` - The base URL for resolving relative links
///
/// # Example
///
/// ```
/// use summit_pipeline::pipeline::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, "https://example.com/", &base_url);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links, vec!["https://example.com/page".to_string()]);
/// ```
pub fn parse_html(html: &str, url: &str, base_url: &Url) -> ProcessedData {
    let document = Html::parse_document(html);

    ProcessedData {
        url: url.to_string(),
        title: extract_title(&document),
        meta_description: extract_meta_description(&document),
        headings: extract_headings(&document),
        links: extract_links(&document, base_url),
        word_count: count_words(&document),
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_meta_description(document: &Html) -> Option<String> {
    let selector = Selector::parse("meta[name='description'][content]").ok()?;

    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_headings(document: &Html) -> Vec<Heading> {
    let Ok(selector) = Selector::parse("h1, h2, h3, h4, h5, h6") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| {
            let level = element.value().name().strip_prefix('h')?.parse().ok()?;
            let text = collapse_whitespace(element);
            (!text.is_empty()).then_some(Heading { level, text })
        })
        .collect()
}

fn collapse_whitespace(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(absolute_url) = element
                .value()
                .attr("href")
                .and_then(|href| resolve_link(href, base_url))
            {
                links.push(absolute_url);
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(absolute_url) = element
                .value()
                .attr("href")
                .and_then(|href| resolve_link(href, base_url))
            {
                links.push(absolute_url);
            }
        }
    }

    links
}

/// Resolves a link href to an absolute http(s) URL
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    matches!(absolute_url.scheme(), "http" | "https").then(|| absolute_url.to_string())
}

/// Counts whitespace-separated words in the body, ignoring scripts and styles
fn count_words(document: &Html) -> usize {
    let Ok(body_selector) = Selector::parse("body") else {
        return 0;
    };
    let Some(body) = document.select(&body_selector).next() else {
        return 0;
    };

    body.descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let inside_code = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .map(|el| matches!(el.name(), "script" | "style" | "noscript"))
                    .unwrap_or(false)
            });
            (!inside_code).then(|| text.split_whitespace().count())
        })
        .sum()
}
