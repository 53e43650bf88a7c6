//! HTTP collector
//!
//! This module fetches page content over HTTP and classifies failures:
//! - Building the HTTP client with the configured user agent
//! - Following redirects (max 10 hops)
//! - Mapping responses and transport errors onto [`CollectionError`]

use crate::config::{Config, UserAgentConfig};
use crate::pipeline::collaborators::{CollectionError, CollectionResult, Collector};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{redirect::Policy, Client};
use std::error::Error as _;
use std::time::Duration;
use url::Url;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `timeout` - Total request timeout
/// * `connect_timeout` - Timeout for establishing the connection
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    timeout: Duration,
    connect_timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(timeout)
        .connect_timeout(connect_timeout)
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Collector that fetches pages with `reqwest`
///
/// Reads `timeout-secs` and `connect-timeout-secs` from `[stages.collect]`.
pub struct HttpCollector {
    client: Client,
}

impl HttpCollector {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let settings = &config.stages.collect;
        let timeout = seconds_setting(settings, "timeout-secs", DEFAULT_TIMEOUT_SECS);
        let connect_timeout =
            seconds_setting(settings, "connect-timeout-secs", DEFAULT_CONNECT_TIMEOUT_SECS);

        let client = build_http_client(&config.user_agent, timeout, connect_timeout)?;
        Ok(Self { client })
    }
}

fn seconds_setting(settings: &toml::Table, key: &str, default: u64) -> Duration {
    let secs = settings
        .get(key)
        .and_then(|value| value.as_integer())
        .and_then(|secs| u64::try_from(secs).ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(default);
    Duration::from_secs(secs)
}

#[async_trait]
impl Collector for HttpCollector {
    /// Fetches a URL and classifies the outcome
    ///
    /// | Condition | Result |
    /// |-----------|--------|
    /// | 2xx | Success |
    /// | 5xx | `ServerError` (transient) |
    /// | 4xx, including 429 | `ClientError` (permanent) |
    /// | Timeout | `Timeout` (transient) |
    /// | DNS failure | `Dns` (permanent) |
    /// | Connection refused, TLS error | `Connect` (permanent) |
    async fn collect(
        &self,
        url: &Url,
        _config: &Config,
    ) -> Result<CollectionResult, CollectionError> {
        tracing::debug!("Fetching {}", url);

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(CollectionError::ServerError {
                status: status.as_u16(),
            });
        }
        if status.is_client_error() {
            return Err(CollectionError::ClientError {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(CollectionError::Other(format!(
                "Unexpected HTTP status {}",
                status.as_u16()
            )));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.text().await.map_err(classify_error)?;

        Ok(CollectionResult {
            url: url.to_string(),
            final_url,
            status_code: status.as_u16(),
            content_type,
            body,
            fetched_at: Utc::now(),
        })
    }
}

/// Maps a transport error onto the collection error taxonomy
fn classify_error(err: reqwest::Error) -> CollectionError {
    if err.is_timeout() {
        CollectionError::Timeout
    } else if err.is_connect() {
        if mentions_dns(&err) {
            CollectionError::Dns(err.to_string())
        } else {
            CollectionError::Connect(err.to_string())
        }
    } else if err.is_body() || err.is_decode() {
        CollectionError::Body(err.to_string())
    } else {
        CollectionError::Other(err.to_string())
    }
}

/// hyper reports resolver failures as connect errors; the cause chain names them
fn mentions_dns(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("dns") || text.contains("lookup address") {
            return true;
        }
        source = cause.source();
    }
    false
}
