//! Summit Pipeline main entry point
//!
//! This is the command-line interface for running audit batches and managing
//! the stage result cache.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use summit_pipeline::config::{load_config_with_hash, Config};
use summit_pipeline::output::{print_batch_summary, print_cache_stats, LogReporter, Reporter};
use summit_pipeline::{open_cache, run_batch, CollaboratorRegistry};
use tracing_subscriber::EnvFilter;

/// Summit Pipeline: cached, parallel website audits
///
/// Runs every URL through the collect, process and analyze stages on a
/// bounded worker pool, reusing cached stage results where the URL and the
/// relevant configuration are unchanged.
#[derive(Parser, Debug)]
#[command(name = "summit-pipeline")]
#[command(version)]
#[command(about = "Cached, parallel website audit pipeline", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// URLs to audit; defaults to `targets` from the config file
    #[arg(value_name = "URL")]
    urls: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be run without running it
    #[arg(long, conflicts_with_all = ["cache_stats", "clear_cache"])]
    dry_run: bool,

    /// Sweep expired entries and show cache statistics
    #[arg(long, conflicts_with_all = ["dry_run", "clear_cache"])]
    cache_stats: bool,

    /// Remove every entry from the configured cache
    #[arg(long, conflicts_with_all = ["dry_run", "cache_stats"])]
    clear_cache: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let urls = if cli.urls.is_empty() {
        config.targets.clone()
    } else {
        cli.urls.clone()
    };

    if cli.dry_run {
        handle_dry_run(&config, &urls);
    } else if cli.cache_stats {
        handle_cache_stats(&config).await?;
    } else if cli.clear_cache {
        handle_clear_cache(&config).await?;
    } else {
        handle_run(config, urls).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("summit_pipeline=info,warn"),
            1 => EnvFilter::new("summit_pipeline=debug,info"),
            2 => EnvFilter::new("summit_pipeline=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective settings and targets
fn handle_dry_run(config: &Config, urls: &[String]) {
    println!("=== Summit Pipeline Dry Run ===\n");

    println!("Pipeline:");
    println!("  Workers: {}", config.pipeline.worker_count());
    match config.pipeline.job_timeout() {
        Some(timeout) => println!("  Job timeout: {:?}", timeout),
        None => println!("  Job timeout: none"),
    }
    match config.pipeline.batch_timeout() {
        Some(timeout) => println!("  Batch timeout: {:?}", timeout),
        None => println!("  Batch timeout: none"),
    }

    println!("\nRetry:");
    println!("  Max retries: {}", config.retry.max_retries);
    println!(
        "  Backoff: {}ms base, {}ms max",
        config.retry.backoff_base_ms, config.retry.backoff_max_ms
    );

    println!("\nRate Limit (per host):");
    println!("  Requests per second: {}", config.rate_limit.requests_per_second);
    println!("  Burst: {}", config.rate_limit.burst);
    println!(
        "  Max concurrent requests: {}",
        config.rate_limit.max_concurrent_per_host
    );

    println!("\nCache:");
    println!("  Backend: {}", config.cache.backend.as_str());
    println!("  TTL: {}s", config.cache.ttl_secs);
    println!("  Max entries: {}", config.cache.max_entries);
    if let Some(path) = &config.cache.path {
        println!("  Path: {}", path);
    }

    println!("\nCollaborators:");
    println!("  Collector: {}", config.collectors.collector);
    println!("  Processor: {}", config.collectors.processor);
    println!("  Analyzer: {}", config.collectors.analyzer);

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nTargets ({}):", urls.len());
    for url in urls {
        println!("  - {}", url);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --cache-stats mode
async fn handle_cache_stats(config: &Config) -> anyhow::Result<()> {
    let cache = open_cache(&config.cache).await?;

    let swept = cache.sweep_expired().await?;
    if swept > 0 {
        tracing::info!("Removed {} expired entries", swept);
    }

    let stats = cache.stats().await?;
    print_cache_stats(cache.backend_name(), &stats);
    Ok(())
}

/// Handles the --clear-cache mode
async fn handle_clear_cache(config: &Config) -> anyhow::Result<()> {
    let cache = open_cache(&config.cache).await?;
    cache.clear().await?;
    println!("✓ Cleared {} cache", cache.backend_name());
    Ok(())
}

/// Handles the main batch run
async fn handle_run(config: Config, urls: Vec<String>) -> anyhow::Result<()> {
    if urls.is_empty() {
        bail!("No URLs given on the command line and no targets in the config");
    }

    let registry = CollaboratorRegistry::with_builtins();
    let batch = run_batch(Arc::new(config), &urls, &registry)
        .await
        .context("Batch could not be started")?;

    LogReporter.report(&batch)?;
    print_batch_summary(&batch);
    Ok(())
}
