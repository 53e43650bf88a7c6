//! Pipeline module: collaborators, orchestration and the worker pool
//!
//! This module handles:
//! - Collaborator capabilities and the built-in HTTP/HTML implementations
//! - Per-host throttling and retry with backoff for collection
//! - Driving each job through the cached stages
//! - Scheduling jobs on a bounded pool of workers

mod analyzer;
mod collaborators;
mod fetcher;
mod job;
mod orchestrator;
mod parser;
mod registry;
mod result;
mod retry;
mod task_manager;
mod throttle;

pub use analyzer::PassthroughAnalyzer;
pub use collaborators::{
    AnalysisError, AnalysisResult, Analyzer, CollectionError, CollectionResult, Collector,
    Finding, Heading, ProcessedData, Processor, ProcessingError, Severity,
};
pub use fetcher::{build_http_client, HttpCollector};
pub use job::{Job, JobId};
pub use orchestrator::Pipeline;
pub use parser::{parse_html, HtmlProcessor};
pub use registry::{CollaboratorRegistry, Collaborators};
pub use result::{ErrorInfo, ErrorKind, PipelineResult, StageFlags};
pub use retry::RetryPolicy;
pub use task_manager::{JobHandle, TaskManager};
pub use throttle::{HostPermit, HostThrottle};

use crate::cache::{open_cache, spawn_sweeper};
use crate::config::Config;
use crate::output::BatchResult;
use crate::url::normalize_url;
use crate::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs one batch end to end
///
/// # Flow
///
/// 1. Validate every URL (fails before anything is scheduled)
/// 2. Open the configured cache backend (fails before anything is scheduled)
/// 3. Build the collaborators named in the config from `registry`
/// 4. Submit all URLs, wait for them under the batch timeout, aggregate
///
/// # Arguments
///
/// * `config` - Immutable configuration snapshot for the whole batch
/// * `urls` - URLs to audit, in the order results should be reported
/// * `registry` - Source of the collaborators
///
/// # Returns
///
/// * `Ok(BatchResult)` - Every URL's outcome, even if some jobs failed
/// * `Err(PipelineError)` - Invalid input, cache backend or collaborator
///   construction failed
pub async fn run_batch(
    config: Arc<Config>,
    urls: &[String],
    registry: &CollaboratorRegistry,
) -> Result<BatchResult> {
    for url in urls {
        normalize_url(url)?;
    }

    let cache = open_cache(&config.cache).await?;
    let collaborators = registry.build(&config)?;

    let shutdown = CancellationToken::new();
    let sweeper = config
        .cache
        .sweep_interval()
        .map(|interval| spawn_sweeper(Arc::clone(&cache), interval, shutdown.clone()));

    let pipeline = Arc::new(Pipeline::new(Arc::clone(&config), cache, collaborators));
    let mut manager = TaskManager::new(pipeline);

    tracing::info!("Submitting {} URLs", urls.len());
    for url in urls {
        manager.submit(url)?;
    }

    let batch = manager.wait_all(config.pipeline.batch_timeout()).await;

    shutdown.cancel();
    if let Some(sweeper) = sweeper {
        let _ = sweeper.await;
    }

    Ok(batch)
}
