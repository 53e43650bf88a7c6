//! Pipeline orchestrator
//!
//! Drives a single job through Collect, Process and Analyze:
//! 1. At each stage boundary, stop if the job was cancelled or its deadline passed
//! 2. Compute the stage fingerprint and consult the cache
//! 3. On a miss, invoke the collaborator (serialised per fingerprint) and
//!    store the result best-effort
//!
//! A stage in flight is only interrupted by the job deadline or the batch
//! timeout; plain cancellation waits for the next boundary.

use crate::cache::{CacheStore, KeyLocks};
use crate::config::Config;
use crate::fingerprint::{Fingerprint, StageDigests};
use crate::pipeline::collaborators::CollectionResult;
use crate::pipeline::job::Job;
use crate::pipeline::registry::Collaborators;
use crate::pipeline::result::ErrorInfo;
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::throttle::HostThrottle;
use crate::state::{JobState, Stage};
use crate::url::extract_host;
use crate::PipelineError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Why a job stopped before succeeding
#[derive(Debug)]
enum StageFailure {
    Error(PipelineError),
    /// Cancellation observed at a boundary or during retry backoff
    Cancelled,
    /// The job's own deadline passed
    DeadlineExceeded,
    /// The batch timeout aborted the stage in flight
    BatchTimeout,
}

impl From<PipelineError> for StageFailure {
    fn from(err: PipelineError) -> Self {
        Self::Error(err)
    }
}

impl StageFailure {
    /// Terminal state and error for a job at `url`
    fn into_terminal(self, url: &Url) -> (JobState, PipelineError) {
        let url = url.to_string();
        match self {
            Self::Error(err) => (JobState::Failed, err),
            Self::Cancelled => (JobState::Cancelled, PipelineError::Cancelled { url }),
            Self::DeadlineExceeded => (JobState::Cancelled, PipelineError::Timeout { url }),
            Self::BatchTimeout => (JobState::Failed, PipelineError::Timeout { url }),
        }
    }
}

/// Runs jobs through the stages against a shared cache
pub struct Pipeline {
    config: Arc<Config>,
    digests: StageDigests,
    cache: Arc<dyn CacheStore>,
    collaborators: Collaborators,
    throttle: HostThrottle,
    retry: RetryPolicy,
    flights: KeyLocks,
}

impl Pipeline {
    pub fn new(
        config: Arc<Config>,
        cache: Arc<dyn CacheStore>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            digests: StageDigests::from_config(&config),
            throttle: HostThrottle::new(&config.rate_limit),
            retry: RetryPolicy::from_config(&config.retry),
            flights: KeyLocks::default(),
            config,
            cache,
            collaborators,
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Fingerprint of `url` for `stage` under this pipeline's config
    pub fn fingerprint(&self, url: &Url, stage: Stage) -> Fingerprint {
        self.digests.fingerprint(url, stage)
    }

    /// Runs `job` to a terminal state
    ///
    /// Never returns an error: stage failures are recorded on the job.
    pub async fn execute(&self, job: &mut Job, deadline: Option<Instant>) {
        let started = Instant::now();
        let outcome = self.run_stages(job, deadline).await;
        job.result.duration = started.elapsed();

        match outcome {
            Ok(()) => {
                if let Err(e) = job.transition(JobState::Succeeded) {
                    tracing::error!("{}: {}", job.id, e);
                }
                tracing::debug!("{} succeeded for {}", job.id, job.url);
            }
            Err(failure) => {
                let stage = job.state.stage();
                let (state, err) = failure.into_terminal(&job.url);
                match state {
                    JobState::Cancelled => tracing::info!("{} cancelled: {}", job.id, err),
                    _ => tracing::warn!("{} failed: {}", job.id, err),
                }
                job.error = Some(ErrorInfo::from_error(&err, stage));

                if let Err(e) = job.transition(state) {
                    tracing::error!("{}: {}", job.id, e);
                    job.state = state;
                }
            }
        }
    }

    async fn run_stages(
        &self,
        job: &mut Job,
        deadline: Option<Instant>,
    ) -> Result<(), StageFailure> {
        let url = job.url.clone();
        let abort = job.abort.clone();
        let cancel = job.cancel.clone();

        // ===== Collect =====
        self.enter(job, Stage::Collect, deadline)?;
        let mut attempts = 0;
        let outcome = self
            .interruptible(
                &abort,
                deadline,
                self.cached(
                    Stage::Collect,
                    &url,
                    self.collect_with_retry(&url, &cancel, &mut attempts),
                ),
            )
            .await;
        job.attempts = attempts;
        let (collected, hit) = outcome?;
        self.record(job, Stage::Collect, hit);
        job.result.collected = Some(collected.clone());

        // ===== Process =====
        self.enter(job, Stage::Process, deadline)?;
        let processor = Arc::clone(&self.collaborators.processor);
        let config = Arc::clone(&self.config);
        let compute = blocking(move || {
            processor
                .process(&collected, &config)
                .map_err(PipelineError::from)
        });
        let (processed, hit) = self
            .interruptible(&abort, deadline, self.cached(Stage::Process, &url, compute))
            .await?;
        self.record(job, Stage::Process, hit);
        job.result.processed = Some(processed.clone());

        // ===== Analyze =====
        self.enter(job, Stage::Analyze, deadline)?;
        let analyzer = Arc::clone(&self.collaborators.analyzer);
        let config = Arc::clone(&self.config);
        let compute = blocking(move || {
            analyzer
                .analyze(&processed, &config)
                .map_err(PipelineError::from)
        });
        let (analyzed, hit) = self
            .interruptible(&abort, deadline, self.cached(Stage::Analyze, &url, compute))
            .await?;
        self.record(job, Stage::Analyze, hit);
        job.result.analyzed = Some(analyzed);

        Ok(())
    }

    /// Stage boundary: checks cancellation and the deadline, then enters `stage`
    fn enter(
        &self,
        job: &mut Job,
        stage: Stage,
        deadline: Option<Instant>,
    ) -> Result<(), StageFailure> {
        if job.cancel.is_cancelled() || job.abort.is_cancelled() {
            return Err(StageFailure::Cancelled);
        }
        if deadline.map_or(false, |deadline| Instant::now() >= deadline) {
            return Err(StageFailure::DeadlineExceeded);
        }

        job.transition(JobState::for_stage(stage))?;
        job.result.attempted.set(stage);
        Ok(())
    }

    fn record(&self, job: &mut Job, stage: Stage, hit: bool) {
        if hit {
            job.result.cache_hits.set(stage);
        }
        tracing::debug!(
            "{} {} stage for {} ({})",
            job.id,
            stage,
            job.url,
            if hit { "cache hit" } else { "computed" }
        );
    }

    /// Races a stage against the batch abort signal and the job deadline
    async fn interruptible<T>(
        &self,
        abort: &CancellationToken,
        deadline: Option<Instant>,
        stage: impl Future<Output = Result<T, StageFailure>>,
    ) -> Result<T, StageFailure> {
        let deadline_reached = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = abort.cancelled() => Err(StageFailure::BatchTimeout),
            _ = deadline_reached => Err(StageFailure::DeadlineExceeded),
            result = stage => result,
        }
    }

    /// Returns the cached value for `stage` or computes and stores it
    ///
    /// The second value is true when the result came from the cache.
    async fn cached<T, F>(&self, stage: Stage, url: &Url, compute: F) -> Result<(T, bool), StageFailure>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = Result<T, StageFailure>>,
    {
        let key = self.digests.fingerprint(url, stage);
        if let Some(value) = self.lookup(stage, &key).await {
            return Ok((value, true));
        }

        let _flight = self.flights.lock(&key).await;
        // Another job may have populated the entry while we waited
        if let Some(value) = self.lookup(stage, &key).await {
            return Ok((value, true));
        }

        let value = compute.await?;
        self.store(stage, &key, &value).await;
        Ok((value, false))
    }

    /// Cache read; every failure is a miss
    async fn lookup<T: DeserializeOwned>(&self, stage: Stage, key: &Fingerprint) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!("Discarding undecodable {} cache entry {}: {}", stage, key, e);
                    if let Err(e) = self.cache.delete(key).await {
                        tracing::warn!("{}", e);
                    }
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("{} cache lookup treated as miss: {}", stage, e);
                None
            }
        }
    }

    /// Best-effort cache write
    async fn store<T: Serialize>(&self, stage: Stage, key: &Fingerprint, value: &T) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to encode {} result for caching: {}", stage, e);
                return;
            }
        };

        if let Err(e) = self.cache.set(key, bytes, self.config.cache.ttl()).await {
            tracing::warn!("Failed to cache {} result: {}", stage, e);
        }
    }

    /// Collects `url`, retrying transient failures with backoff
    ///
    /// Every attempt waits for the host throttle first. `attempts` counts
    /// collector invocations.
    async fn collect_with_retry(
        &self,
        url: &Url,
        cancel: &CancellationToken,
        attempts: &mut u32,
    ) -> Result<CollectionResult, StageFailure> {
        let host = extract_host(url).unwrap_or_else(|| url.as_str().to_string());

        loop {
            *attempts += 1;
            let attempt = *attempts;

            let result = {
                let _permit = self.throttle.acquire(&host).await;
                self.collaborators.collector.collect(url, &self.config).await
            };

            let err = match result {
                Ok(collected) => return Ok(collected),
                Err(err) => err,
            };

            if !err.is_transient() || !self.retry.should_retry(attempt) {
                return Err(PipelineError::Collection(err).into());
            }

            let delay = self.retry.delay(attempt);
            tracing::warn!(
                "Attempt {}/{} for {} failed: {}; retrying in {:?}",
                attempt,
                self.retry.max_attempts(),
                url,
                err,
                delay
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(StageFailure::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Runs a CPU-bound stage on the blocking thread pool
async fn blocking<T, F>(f: F) -> Result<T, StageFailure>
where
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Internal(format!("stage task failed: {}", e)))?
        .map_err(StageFailure::from)
}
