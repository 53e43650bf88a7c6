//! Integration tests for the pipeline core
//!
//! These tests run whole batches through the task manager with stub
//! collaborators, so every stage invocation can be counted and timed.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use summit_pipeline::cache::{CacheError, CacheResult, CacheStats, CacheStore, MemoryCache};
use summit_pipeline::config::{CacheBackend, Config};
use summit_pipeline::fingerprint::Fingerprint;
use summit_pipeline::output::BatchResult;
use summit_pipeline::pipeline::{
    AnalysisError, AnalysisResult, Analyzer, CollaboratorRegistry, Collaborators,
    CollectionError, CollectionResult, Collector, ErrorKind, Pipeline, ProcessedData, Processor,
    ProcessingError, TaskManager,
};
use summit_pipeline::{run_batch, JobState, Stage};
use url::Url;

// ===== Stub collaborators =====

/// Collector returning a tiny HTML page per URL
#[derive(Default)]
struct StubCollector {
    calls: AtomicU32,

    /// Artificial latency per URL path
    delays: HashMap<String, Duration>,

    /// Permanent failures per URL path
    failing: HashMap<String, CollectionError>,

    /// Number of calls answered with a timeout before succeeding
    flaky: AtomicU32,
}

impl StubCollector {
    fn with_delays(delays: &[(&str, u64)]) -> Self {
        Self {
            delays: delays
                .iter()
                .map(|(path, ms)| (path.to_string(), Duration::from_millis(*ms)))
                .collect(),
            ..Self::default()
        }
    }

    fn failing(path: &str, error: CollectionError) -> Self {
        let mut collector = Self::default();
        collector.failing.insert(path.to_string(), error);
        collector
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Collector for StubCollector {
    async fn collect(&self, url: &Url, _config: &Config) -> Result<CollectionResult, CollectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(url.path()) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(err) = self.failing.get(url.path()) {
            return Err(err.clone());
        }
        if self
            .flaky
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(CollectionError::Timeout);
        }

        Ok(CollectionResult {
            url: url.to_string(),
            final_url: url.to_string(),
            status_code: 200,
            content_type: Some("text/html".to_string()),
            body: format!("<html><title>{}</title></html>", url.path()),
            fetched_at: Utc::now(),
        })
    }
}

/// Processor that fails for any URL whose path contains "broken"
#[derive(Default)]
struct StubProcessor {
    calls: AtomicU32,
}

impl Processor for StubProcessor {
    fn process(
        &self,
        input: &CollectionResult,
        _config: &Config,
    ) -> Result<ProcessedData, ProcessingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if input.url.contains("broken") {
            return Err(ProcessingError::new("unparseable document"));
        }

        Ok(ProcessedData {
            url: input.url.clone(),
            title: Some(input.body.clone()),
            word_count: 1,
            ..ProcessedData::default()
        })
    }
}

#[derive(Default)]
struct StubAnalyzer {
    calls: AtomicU32,
}

impl Analyzer for StubAnalyzer {
    fn analyze(&self, input: &ProcessedData, _config: &Config) -> Result<AnalysisResult, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AnalysisResult {
            url: input.url.clone(),
            score: 50.0,
            findings: Vec::new(),
        })
    }
}

/// Cache whose backend is permanently unreachable
struct UnreachableCache;

#[async_trait]
impl CacheStore for UnreachableCache {
    fn backend_name(&self) -> &'static str {
        "unreachable"
    }

    async fn get(&self, _key: &Fingerprint) -> CacheResult<Option<Vec<u8>>> {
        Err(CacheError::unavailable("unreachable", "connection refused"))
    }

    async fn set(&self, _key: &Fingerprint, _value: Vec<u8>, _ttl: Duration) -> CacheResult<()> {
        Err(CacheError::unavailable("unreachable", "connection refused"))
    }

    async fn delete(&self, _key: &Fingerprint) -> CacheResult<bool> {
        Err(CacheError::unavailable("unreachable", "connection refused"))
    }

    async fn clear(&self) -> CacheResult<()> {
        Err(CacheError::unavailable("unreachable", "connection refused"))
    }

    async fn sweep_expired(&self) -> CacheResult<usize> {
        Err(CacheError::unavailable("unreachable", "connection refused"))
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        Err(CacheError::unavailable("unreachable", "connection refused"))
    }
}

// ===== Harness =====

struct Harness {
    collector: Arc<StubCollector>,
    processor: Arc<StubProcessor>,
    analyzer: Arc<StubAnalyzer>,
    cache: Arc<dyn CacheStore>,
}

impl Harness {
    fn new(collector: StubCollector) -> Self {
        Self::with_cache(collector, Arc::new(MemoryCache::new(1000)))
    }

    fn with_cache(collector: StubCollector, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            collector: Arc::new(collector),
            processor: Arc::new(StubProcessor::default()),
            analyzer: Arc::new(StubAnalyzer::default()),
            cache,
        }
    }

    fn manager(&self, config: Config) -> TaskManager {
        let collaborators = Collaborators {
            collector: Arc::clone(&self.collector) as Arc<dyn Collector>,
            processor: Arc::clone(&self.processor) as Arc<dyn Processor>,
            analyzer: Arc::clone(&self.analyzer) as Arc<dyn Analyzer>,
        };
        let pipeline = Pipeline::new(Arc::new(config), Arc::clone(&self.cache), collaborators);
        TaskManager::new(Arc::new(pipeline))
    }

    async fn run(&self, config: Config, urls: &[&str]) -> BatchResult {
        let mut manager = self.manager(config);
        for url in urls {
            manager.submit(url).expect("valid test URL");
        }
        manager.wait_all(None).await
    }
}

/// Creates a test configuration with fast retries and a permissive throttle
fn test_config(workers: usize) -> Config {
    let mut config = Config::default();
    config.pipeline.max_workers = Some(workers);
    config.retry.max_retries = 2;
    config.retry.backoff_base_ms = 1;
    config.retry.backoff_max_ms = 5;
    config.rate_limit.requests_per_second = 1000.0;
    config.rate_limit.burst = 1000;
    config.rate_limit.max_concurrent_per_host = 100;
    config
}

// ===== Ordering and aggregation =====

#[tokio::test]
async fn test_results_follow_submission_order() {
    // Earlier URLs take longer, so completion order is the reverse
    let harness = Harness::new(StubCollector::with_delays(&[
        ("/a", 120),
        ("/b", 80),
        ("/c", 40),
        ("/d", 0),
    ]));
    let urls = [
        "https://example.com/a",
        "https://example.com/b",
        "https://example.com/c",
        "https://example.com/d",
    ];

    let batch = harness.run(test_config(4), &urls).await;

    let reported: Vec<&str> = batch.jobs.iter().map(|job| job.url.as_str()).collect();
    assert_eq!(reported, urls);
    for (index, job) in batch.jobs.iter().enumerate() {
        assert_eq!(job.id.0, index as u64);
        assert_eq!(job.state, JobState::Succeeded);
        assert!(job.result.analyzed.is_some());
    }
    assert_eq!(batch.summary.total, 4);
    assert_eq!(batch.summary.succeeded, 4);
}

#[tokio::test]
async fn test_partial_failure_is_reported_per_url() {
    let harness = Harness::new(StubCollector::default());
    let batch = harness
        .run(
            test_config(2),
            &[
                "https://example.com/ok",
                "https://example.com/broken",
                "https://example.com/fine",
            ],
        )
        .await;

    assert_eq!(batch.summary.succeeded, 2);
    assert_eq!(batch.summary.failed, 1);

    let failed = &batch.jobs[1];
    assert_eq!(failed.state, JobState::Failed);
    assert_eq!(failed.failed_stage(), Some(Stage::Process));
    let error = failed.error.as_ref().expect("failed job carries an error");
    assert_eq!(error.kind, ErrorKind::Processing);
    assert!(error.message.contains("unparseable document"));

    // Output of the stage before the failure is kept
    assert!(failed.result.collected.is_some());
    assert!(failed.result.processed.is_none());

    assert_eq!(batch.failures().count(), 1);
}

#[tokio::test]
async fn test_empty_batch() {
    let harness = Harness::new(StubCollector::default());
    let batch = harness.run(test_config(2), &[]).await;

    assert!(batch.jobs.is_empty());
    assert_eq!(batch.summary.total, 0);
    assert_eq!(batch.summary.cache_hit_rate, 0.0);
}

// ===== Cache behavior =====

#[tokio::test]
async fn test_duplicate_url_served_from_cache() {
    let harness = Harness::new(StubCollector::default());
    let batch = harness
        .run(
            test_config(1),
            &["https://example.com/page", "https://example.com/page"],
        )
        .await;

    assert_eq!(harness.collector.calls(), 1);
    assert_eq!(harness.processor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.analyzer.calls.load(Ordering::SeqCst), 1);

    let hits: Vec<bool> = batch
        .jobs
        .iter()
        .map(|job| job.result.cache_hits.analyze)
        .collect();
    assert_eq!(hits, vec![false, true]);

    // 3 hits out of 6 attempted stages
    assert_eq!(batch.summary.cache_hits, 3);
    assert_eq!(batch.summary.stages_attempted, 6);
    assert!((batch.summary.cache_hit_rate - 0.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_concurrent_duplicates_compute_once() {
    let harness = Harness::new(StubCollector::with_delays(&[("/slow", 50)]));
    let url = "https://example.com/slow";

    let batch = harness.run(test_config(4), &[url, url, url, url]).await;

    assert_eq!(batch.summary.succeeded, 4);
    assert_eq!(harness.collector.calls(), 1);
    assert_eq!(harness.processor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.analyzer.calls.load(Ordering::SeqCst), 1);

    let computed = batch
        .jobs
        .iter()
        .filter(|job| !job.result.cache_hits.collect)
        .count();
    assert_eq!(computed, 1);
}

#[tokio::test]
async fn test_second_batch_reuses_shared_cache() {
    let harness = Harness::new(StubCollector::default());
    let urls = ["https://example.com/one", "https://example.com/two"];

    let first = harness.run(test_config(2), &urls).await;
    assert_eq!(first.summary.cache_hit_rate, 0.0);

    let second = harness.run(test_config(2), &urls).await;
    assert_eq!(second.summary.succeeded, 2);
    assert!((second.summary.cache_hit_rate - 1.0).abs() < f64::EPSILON);
    assert_eq!(harness.collector.calls(), 2);
}

#[tokio::test]
async fn test_changed_analyze_settings_recompute_only_analysis() {
    let harness = Harness::new(StubCollector::default());
    let urls = ["https://example.com/page"];

    harness.run(test_config(1), &urls).await;

    let mut changed = test_config(1);
    changed
        .stages
        .analyze
        .insert("min-score".to_string(), toml::Value::Integer(80));
    let batch = harness.run(changed, &urls).await;

    let flags = &batch.jobs[0].result.cache_hits;
    assert!(flags.collect);
    assert!(flags.process);
    assert!(!flags.analyze);
    assert_eq!(harness.collector.calls(), 1);
    assert_eq!(harness.analyzer.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unreachable_cache_degrades_to_misses() {
    let harness = Harness::with_cache(StubCollector::default(), Arc::new(UnreachableCache));
    let batch = harness
        .run(
            test_config(2),
            &["https://example.com/a", "https://example.com/b"],
        )
        .await;

    assert_eq!(batch.summary.succeeded, 2);
    assert_eq!(batch.summary.cache_hits, 0);
    assert_eq!(batch.summary.cache_hit_rate, 0.0);
    assert_eq!(harness.collector.calls(), 2);
}

// ===== Retry =====

#[tokio::test]
async fn test_transient_failures_stop_after_max_retries() {
    let harness = Harness::new(StubCollector::failing(
        "/down",
        CollectionError::ServerError { status: 503 },
    ));
    let batch = harness
        .run(test_config(1), &["https://example.com/down"])
        .await;

    let job = &batch.jobs[0];
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 3);
    assert_eq!(harness.collector.calls(), 3);

    let error = job.error.as_ref().expect("failed job carries an error");
    assert_eq!(error.kind, ErrorKind::Collection);
    assert_eq!(error.stage, Some(Stage::Collect));
    assert!(error.transient);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let harness = Harness::new(StubCollector::failing(
        "/missing",
        CollectionError::ClientError { status: 404 },
    ));
    let batch = harness
        .run(test_config(1), &["https://example.com/missing"])
        .await;

    let job = &batch.jobs[0];
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 1);
    assert_eq!(harness.collector.calls(), 1);
    assert!(!job.error.as_ref().map_or(true, |e| e.transient));
}

#[tokio::test]
async fn test_transient_failure_recovers_on_retry() {
    let collector = StubCollector::default();
    collector.flaky.store(2, Ordering::SeqCst);
    let harness = Harness::new(collector);

    let batch = harness
        .run(test_config(1), &["https://example.com/flaky"])
        .await;

    let job = &batch.jobs[0];
    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(job.attempts, 3);
    assert!(job.error.is_none());
}

// ===== Cancellation and deadlines =====

#[tokio::test]
async fn test_cancel_all_cancels_every_job() {
    let harness = Harness::new(StubCollector::with_delays(&[
        ("/a", 100),
        ("/b", 100),
        ("/c", 100),
    ]));
    let mut manager = harness.manager(test_config(1));
    for url in [
        "https://example.com/a",
        "https://example.com/b",
        "https://example.com/c",
    ] {
        manager.submit(url).unwrap();
    }

    manager.cancel_all();
    let batch = manager.wait_all(None).await;

    assert_eq!(batch.summary.cancelled, 3);
    assert_eq!(batch.summary.succeeded, 0);
    for job in &batch.jobs {
        assert_eq!(job.state, JobState::Cancelled);
        assert_eq!(job.error.as_ref().map(|e| e.kind), Some(ErrorKind::Cancelled));
    }
    // The in-flight collection finishes but nothing after it runs
    assert!(harness.collector.calls() <= 1);
    assert_eq!(harness.processor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancelling_one_handle_leaves_others_running() {
    let harness = Harness::new(StubCollector::with_delays(&[("/a", 50)]));
    let mut manager = harness.manager(test_config(1));

    manager.submit("https://example.com/a").unwrap();
    let b = manager.submit("https://example.com/b").unwrap();
    manager.submit("https://example.com/c").unwrap();

    b.cancel();
    assert!(b.is_cancelled());
    let batch = manager.wait_all(None).await;

    let states: Vec<JobState> = batch.jobs.iter().map(|job| job.state).collect();
    assert_eq!(
        states,
        vec![JobState::Succeeded, JobState::Cancelled, JobState::Succeeded]
    );
    // Cancelled before it started: no stage was attempted
    assert_eq!(batch.jobs[1].result.attempted.count(), 0);
    assert_eq!(harness.collector.calls(), 2);
}

#[tokio::test]
async fn test_cancellation_token_cancels_running_batch() {
    let harness = Harness::new(StubCollector::with_delays(&[("/a", 100), ("/b", 100)]));
    let mut manager = harness.manager(test_config(1));
    manager.submit("https://example.com/a").unwrap();
    manager.submit("https://example.com/b").unwrap();

    let token = manager.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let batch = manager.wait_all(None).await;
    assert_eq!(batch.summary.cancelled, 2);
}

#[tokio::test]
async fn test_job_deadline_cancels_slow_job() {
    let harness = Harness::new(StubCollector::with_delays(&[("/slow", 2000)]));
    let mut config = test_config(2);
    config.pipeline.job_timeout_ms = Some(50);

    let batch = harness
        .run(
            config,
            &["https://example.com/slow", "https://example.com/fast"],
        )
        .await;

    let slow = &batch.jobs[0];
    assert_eq!(slow.state, JobState::Cancelled);
    let error = slow.error.as_ref().expect("timed out job carries an error");
    assert_eq!(error.kind, ErrorKind::Timeout);
    assert_eq!(error.stage, Some(Stage::Collect));

    assert_eq!(batch.jobs[1].state, JobState::Succeeded);
}

#[tokio::test]
async fn test_batch_timeout_fails_in_flight_and_cancels_queued() {
    let harness = Harness::new(StubCollector::with_delays(&[("/a", 2000), ("/b", 2000)]));
    let mut manager = harness.manager(test_config(1));
    manager.submit("https://example.com/a").unwrap();
    manager.submit("https://example.com/b").unwrap();

    let started = std::time::Instant::now();
    let batch = manager.wait_all(Some(Duration::from_millis(100))).await;
    assert!(started.elapsed() < Duration::from_millis(1500));

    let in_flight = &batch.jobs[0];
    assert_eq!(in_flight.state, JobState::Failed);
    assert_eq!(in_flight.error.as_ref().map(|e| e.kind), Some(ErrorKind::Timeout));

    let queued = &batch.jobs[1];
    assert_eq!(queued.state, JobState::Cancelled);
    assert_eq!(queued.result.attempted.count(), 0);
}

// ===== Submission =====

#[tokio::test]
async fn test_submit_rejects_malformed_url() {
    let harness = Harness::new(StubCollector::default());
    let mut manager = harness.manager(test_config(1));

    let err = manager.submit("not a url").unwrap_err();
    assert!(err.is_invalid_input());
    assert!(manager.submit("ftp://example.com/file").is_err());
    assert!(manager.is_empty());

    let handle = manager.submit("https://Example.com/page#top").unwrap();
    assert_eq!(handle.url(), "https://example.com/page");
    assert_eq!(manager.len(), 1);

    let batch = manager.wait_all(None).await;
    assert_eq!(batch.summary.total, 1);
}

// ===== run_batch =====

fn stub_registry(collector: Arc<StubCollector>) -> CollaboratorRegistry {
    let mut registry = CollaboratorRegistry::new();
    registry.add_collector("stub", collector);
    registry.add_processor("stub", Arc::new(StubProcessor::default()));
    registry.add_analyzer("stub", Arc::new(StubAnalyzer::default()));
    registry
}

fn stub_config(workers: usize) -> Config {
    let mut config = test_config(workers);
    config.collectors.collector = "stub".to_string();
    config.collectors.processor = "stub".to_string();
    config.collectors.analyzer = "stub".to_string();
    config
}

#[tokio::test]
async fn test_run_batch_with_file_cache_persists_between_runs() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let collector = Arc::new(StubCollector::default());
    let registry = stub_registry(Arc::clone(&collector));

    let mut config = stub_config(2);
    config.cache.backend = CacheBackend::File;
    config.cache.path = Some(temp_dir.path().to_string_lossy().to_string());
    let config = Arc::new(config);

    let urls = vec![
        "https://example.com/one".to_string(),
        "https://example.com/two".to_string(),
    ];

    let first = run_batch(Arc::clone(&config), &urls, &registry)
        .await
        .expect("first run");
    assert_eq!(first.summary.succeeded, 2);
    assert_eq!(first.summary.cache_hit_rate, 0.0);

    let second = run_batch(config, &urls, &registry)
        .await
        .expect("second run");
    assert_eq!(second.summary.succeeded, 2);
    assert!((second.summary.cache_hit_rate - 1.0).abs() < f64::EPSILON);
    assert_eq!(collector.calls(), 2);
}

#[tokio::test]
async fn test_run_batch_rejects_invalid_url_before_scheduling() {
    let collector = Arc::new(StubCollector::default());
    let registry = stub_registry(Arc::clone(&collector));
    let urls = vec![
        "https://example.com/ok".to_string(),
        "mailto:someone@example.com".to_string(),
    ];

    let result = run_batch(Arc::new(stub_config(1)), &urls, &registry).await;

    assert!(result.err().map_or(false, |e| e.is_invalid_input()));
    assert_eq!(collector.calls(), 0);
}

#[tokio::test]
async fn test_run_batch_unknown_collaborator() {
    let registry = CollaboratorRegistry::new();
    let urls = vec!["https://example.com/".to_string()];

    let result = run_batch(Arc::new(stub_config(1)), &urls, &registry).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_run_batch_sqlite_backend_requires_path() {
    let registry = stub_registry(Arc::new(StubCollector::default()));
    let mut config = stub_config(1);
    config.cache.backend = CacheBackend::Sqlite;

    let urls = vec!["https://example.com/".to_string()];
    assert!(run_batch(Arc::new(config), &urls, &registry).await.is_err());
}
