use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for the pipeline
///
/// Every section is optional in the TOML file; missing sections fall back to
/// their defaults so a config only has to name what it changes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Default URL list used when no URLs are passed on the command line
    #[serde(default)]
    pub targets: Vec<String>,

    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default, rename = "rate-limit")]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default, rename = "user-agent")]
    pub user_agent: UserAgentConfig,

    #[serde(default)]
    pub collectors: CollaboratorNames,

    #[serde(default)]
    pub stages: StageSettings,
}

/// Worker pool and deadline settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineSettings {
    /// Number of workers; defaults to the available parallelism
    pub max_workers: Option<usize>,

    /// Per-job deadline in milliseconds, measured from job start
    pub job_timeout_ms: Option<u64>,

    /// Deadline for a whole batch in milliseconds
    pub batch_timeout_ms: Option<u64>,
}

impl PipelineSettings {
    /// Resolves the worker count, falling back to the machine's parallelism
    pub fn worker_count(&self) -> usize {
        self.max_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_ms.map(Duration::from_millis)
    }

    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_ms.map(Duration::from_millis)
    }
}

/// Retry policy for transient collection failures
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Base delay of the exponential backoff (milliseconds)
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay (milliseconds)
    pub backoff_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 250,
            backoff_max_ms: 10_000,
        }
    }
}

/// Per-host politeness limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RateLimitConfig {
    /// Sustained request rate allowed against a single host
    pub requests_per_second: f64,

    /// Number of requests a host may receive back to back
    pub burst: u32,

    /// Maximum in-flight requests against a single host
    pub max_concurrent_per_host: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2.0,
            burst: 2,
            max_concurrent_per_host: 2,
        }
    }
}

/// Cache backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    File,
    Sqlite,
}

impl CacheBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Cache store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CacheConfig {
    pub backend: CacheBackend,

    /// Time-to-live applied to every stored stage result (seconds)
    pub ttl_secs: u64,

    /// Entry count above which the least-recently-used entry is evicted
    pub max_entries: usize,

    /// Directory (file backend) or database file (sqlite backend)
    pub path: Option<String>,

    /// Interval of the background expiry sweep; lazy expiry only when unset
    pub sweep_interval_secs: Option<u64>,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs.map(Duration::from_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            ttl_secs: 3600,
            max_entries: 10_000,
            path: None,
            sweep_interval_secs: None,
        }
    }
}

/// User agent identification used by the HTTP collector
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    pub crawler_name: String,
    pub crawler_version: String,
    pub contact_url: String,
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SummitBot".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/bot".to_string(),
            contact_email: "bot@example.com".to_string(),
        }
    }
}

/// Names of the collaborators resolved through the registry
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollaboratorNames {
    pub collector: String,
    pub processor: String,
    pub analyzer: String,
}

impl Default for CollaboratorNames {
    fn default() -> Self {
        Self {
            collector: "http".to_string(),
            processor: "html".to_string(),
            analyzer: "passthrough".to_string(),
        }
    }
}

/// Free-form settings handed to each stage's collaborator
///
/// These tables feed the stage digests, so any change to them invalidates the
/// cached results of that stage and everything downstream of it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StageSettings {
    #[serde(default)]
    pub collect: toml::Table,

    #[serde(default)]
    pub process: toml::Table,

    #[serde(default)]
    pub analyze: toml::Table,
}
