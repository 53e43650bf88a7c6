//! Collaborator capabilities and the data passed between stages
//!
//! The pipeline core never fetches, parses or scores anything itself. Each
//! stage delegates to a collaborator:
//! - [`Collector`] fetches raw content for a URL (async, may do network I/O)
//! - [`Processor`] turns raw content into structured data (CPU-bound)
//! - [`Analyzer`] produces a score and findings (CPU-bound)
//!
//! Stage outputs are serde types because they are stored in the cache.

use crate::config::Config;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Raw content fetched for a URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionResult {
    /// The requested URL
    pub url: String,

    /// URL of the response after redirects
    pub final_url: String,

    /// HTTP status code
    pub status_code: u16,

    /// Content-Type header value
    pub content_type: Option<String>,

    /// Response body
    pub body: String,

    pub fetched_at: DateTime<Utc>,
}

/// A heading found in a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// Heading level, 1 to 6
    pub level: u8,
    pub text: String,
}

/// Structured data extracted from collected content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedData {
    pub url: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub headings: Vec<Heading>,

    /// Absolute http(s) links found in the document
    pub links: Vec<String>,

    pub word_count: usize,
}

/// Severity of an analysis finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

/// A single issue reported by an analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Stable identifier of the check that produced the finding
    pub id: String,
    pub severity: Severity,
    pub message: String,
}

/// Score and findings for one URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub url: String,

    /// Score between 0.0 and 100.0
    pub score: f64,

    pub findings: Vec<Finding>,
}

/// Errors reported by a collector
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    #[error("Request timed out")]
    Timeout,

    #[error("Server error: HTTP {status}")]
    ServerError { status: u16 },

    #[error("Client error: HTTP {status}")]
    ClientError { status: u16 },

    #[error("DNS resolution failed: {0}")]
    Dns(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("{0}")]
    Other(String),
}

impl CollectionError {
    /// Returns true for failures worth retrying
    ///
    /// Timeouts and 5xx responses are transient. Everything else (4xx, DNS,
    /// refused connections, TLS, unreadable bodies) is permanent.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::ServerError { .. })
    }
}

/// Deterministic failure of a processor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProcessingError {
    pub message: String,
}

impl ProcessingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Deterministic failure of an analyzer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AnalysisError {
    pub message: String,
}

impl AnalysisError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Fetches raw content for a URL
///
/// Called concurrently from several workers. Transient failures are retried
/// by the task manager, so implementations should not retry internally.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self, url: &Url, config: &Config) -> Result<CollectionResult, CollectionError>;
}

/// Turns collected content into structured data
///
/// Runs on the blocking thread pool and must not perform network I/O.
pub trait Processor: Send + Sync {
    fn process(
        &self,
        input: &CollectionResult,
        config: &Config,
    ) -> Result<ProcessedData, ProcessingError>;
}

/// Scores processed data
///
/// Runs on the blocking thread pool and must not perform network I/O.
pub trait Analyzer: Send + Sync {
    fn analyze(&self, input: &ProcessedData, config: &Config)
        -> Result<AnalysisResult, AnalysisError>;
}
