//! Configuration module for the pipeline
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use summit_pipeline::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("summit.toml")).unwrap();
//! println!("Workers: {}", config.pipeline.worker_count());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CacheBackend, CacheConfig, CollaboratorNames, Config, PipelineSettings, RateLimitConfig,
    RetryConfig, StageSettings, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
