//! Batch and cache statistics
//!
//! This module provides the log reporter and the plain-text summaries printed
//! by the command line tool.

use crate::cache::CacheStats;
use crate::output::traits::{OutputResult, Reporter};
use crate::output::{BatchResult, BatchSummary};

/// Reporter that emits the batch summary and every failure through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, batch: &BatchResult) -> OutputResult<()> {
        let summary = &batch.summary;
        tracing::info!(
            "Batch finished in {}ms: {} succeeded, {} failed, {} cancelled, cache hit rate {:.1}%",
            batch.duration().num_milliseconds(),
            summary.succeeded,
            summary.failed,
            summary.cancelled,
            summary.cache_hit_rate * 100.0
        );

        for job in batch.failures() {
            match &job.error {
                Some(error) => tracing::warn!(
                    "{} {} ({}): {}",
                    job.url,
                    job.state,
                    error.stage.map(|s| s.as_str()).unwrap_or("-"),
                    error.message
                ),
                None => tracing::warn!("{} {}", job.url, job.state),
            }
        }
        Ok(())
    }
}

/// Formats the summary block shown at the end of a run
pub fn format_summary(summary: &BatchSummary) -> String {
    let success_rate = if summary.total > 0 {
        (summary.succeeded as f64 / summary.total as f64) * 100.0
    } else {
        0.0
    };

    format!(
        "Jobs: {} total, {} succeeded, {} failed, {} cancelled\n\
         Success Rate: {:.1}%\n\
         Cache: {} of {} stages served from cache ({:.1}%)",
        summary.total,
        summary.succeeded,
        summary.failed,
        summary.cancelled,
        success_rate,
        summary.cache_hits,
        summary.stages_attempted,
        summary.cache_hit_rate * 100.0
    )
}

/// Prints a batch to stdout in a formatted manner
///
/// # Arguments
///
/// * `batch` - The batch to display
pub fn print_batch_summary(batch: &BatchResult) {
    println!("=== Batch Summary ===\n");

    println!("Results:");
    for job in &batch.jobs {
        let detail = match (&job.result.analyzed, &job.error) {
            (Some(analysis), _) => format!(
                "score {:.1}, {} findings",
                analysis.score,
                analysis.findings.len()
            ),
            (None, Some(error)) => error.message.clone(),
            (None, None) => String::new(),
        };
        println!("  [{}] {} {}", job.state, job.url, detail);
    }
    println!();

    println!("{}", format_summary(&batch.summary));
}

/// Prints cache statistics to stdout
pub fn print_cache_stats(backend: &str, stats: &CacheStats) {
    println!("=== Cache Statistics ({}) ===\n", backend);
    println!("  Entries: {}", stats.entries);
    println!("  Hits: {}", stats.hits);
    println!("  Misses: {}", stats.misses);
    println!("  Evictions: {}", stats.evictions);
    println!("  Expirations: {}", stats.expirations);
    println!("  Hit Rate: {:.1}%", stats.hit_rate() * 100.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::aggregate;
    use chrono::Utc;

    #[test]
    fn test_format_summary() {
        let summary = BatchSummary {
            total: 4,
            succeeded: 3,
            failed: 1,
            cancelled: 0,
            cache_hits: 6,
            stages_attempted: 10,
            cache_hit_rate: 0.6,
        };

        let text = format_summary(&summary);
        assert!(text.contains("4 total, 3 succeeded, 1 failed, 0 cancelled"));
        assert!(text.contains("Success Rate: 75.0%"));
        assert!(text.contains("6 of 10 stages served from cache (60.0%)"));
    }

    #[test]
    fn test_format_empty_summary() {
        let text = format_summary(&BatchSummary::default());
        assert!(text.contains("Success Rate: 0.0%"));
    }

    #[test]
    fn test_log_reporter_accepts_empty_batch() {
        let now = Utc::now();
        assert!(LogReporter.report(&aggregate(Vec::new(), now, now)).is_ok());
    }
}
