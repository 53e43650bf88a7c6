//! Summit Pipeline: the caching, parallel execution core of a website audit
//!
//! This crate fans per-URL analysis work out across a bounded pool of workers,
//! caches every expensive stage result under a content fingerprint, and
//! aggregates per-URL outcomes into one deterministically ordered batch result.
//! The actual fetching, processing and scoring logic is supplied by
//! collaborators plugged in through [`pipeline::CollaboratorRegistry`].

pub mod cache;
pub mod config;
pub mod fingerprint;
pub mod output;
pub mod pipeline;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] UrlError),

    #[error("Collection failed: {0}")]
    Collection(#[from] pipeline::CollectionError),

    #[error("Processing failed: {0}")]
    Processing(#[from] pipeline::ProcessingError),

    #[error("Analysis failed: {0}")]
    Analysis(#[from] pipeline::AnalysisError),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(#[from] cache::CacheError),

    #[error("Deadline exceeded for {url}")]
    Timeout { url: String },

    #[error("Job cancelled: {url}")]
    Cancelled { url: String },

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::JobState,
        to: state::JobState,
    },

    #[error("Unknown {kind} collaborator: {name}")]
    UnknownCollaborator { kind: &'static str, name: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Task manager is closed")]
    Closed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Returns true for errors caused by malformed caller input
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::Config(_) | Self::InvalidUrl(_))
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

// Re-export commonly used types
pub use cache::{open_cache, CacheStore};
pub use config::Config;
pub use fingerprint::{fingerprint, Fingerprint};
pub use output::{aggregate, BatchResult, JobRecord, Reporter};
pub use pipeline::{run_batch, CollaboratorRegistry, Pipeline, TaskManager};
pub use state::{JobState, Stage};
pub use url::{extract_host, normalize_url};
