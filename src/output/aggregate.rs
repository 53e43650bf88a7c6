//! Result aggregation
//!
//! Folds terminal job records into one [`BatchResult`]. Records are ordered by
//! job id, which follows submission order, so the outcome never depends on
//! which worker finished first.

use crate::pipeline::{ErrorInfo, JobId, PipelineResult};
use crate::state::{JobState, Stage};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Final snapshot of one job
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub url: String,
    pub state: JobState,
    pub attempts: u32,

    /// Output produced so far; complete only for succeeded jobs
    pub result: PipelineResult,

    /// Set for failed and cancelled jobs
    pub error: Option<ErrorInfo>,
}

impl JobRecord {
    pub fn is_success(&self) -> bool {
        self.state == JobState::Succeeded
    }

    /// The stage that broke, for failed jobs
    pub fn failed_stage(&self) -> Option<Stage> {
        self.error.as_ref().and_then(|error| error.stage)
    }
}

/// Per-outcome counts of a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,

    /// Stages served from the cache across the batch
    pub cache_hits: u64,

    /// Stages started across the batch
    pub stages_attempted: u64,

    /// `cache_hits / stages_attempted`, 0.0 when nothing was attempted
    pub cache_hit_rate: f64,
}

/// Outcome of a whole batch, in submission order
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub jobs: Vec<JobRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: BatchSummary,
}

impl BatchResult {
    /// Records of jobs that did not succeed
    pub fn failures(&self) -> impl Iterator<Item = &JobRecord> {
        self.jobs.iter().filter(|job| !job.is_success())
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Builds a batch result from terminal job records
///
/// # Arguments
///
/// * `records` - One record per submitted job, in any order
/// * `started_at` - When the batch started
/// * `finished_at` - When the last job reached a terminal state
///
/// # Returns
///
/// The records sorted into submission order, with summary counts. A record
/// that is not terminal counts as failed.
pub fn aggregate(
    mut records: Vec<JobRecord>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
) -> BatchResult {
    records.sort_by_key(|record| record.id);

    let mut summary = BatchSummary {
        total: records.len(),
        ..BatchSummary::default()
    };

    for record in &records {
        match record.state {
            JobState::Succeeded => summary.succeeded += 1,
            JobState::Cancelled => summary.cancelled += 1,
            JobState::Failed => summary.failed += 1,
            state => {
                tracing::warn!("{} aggregated in non-terminal state {}", record.id, state);
                summary.failed += 1;
            }
        }

        summary.cache_hits += record.result.cache_hits.count();
        summary.stages_attempted += record.result.attempted.count();
    }

    summary.cache_hit_rate = if summary.stages_attempted == 0 {
        0.0
    } else {
        summary.cache_hits as f64 / summary.stages_attempted as f64
    };

    BatchResult {
        jobs: records,
        started_at,
        finished_at,
        summary,
    }
}
