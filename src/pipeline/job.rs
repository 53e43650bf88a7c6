use crate::config::Config;
use crate::output::JobRecord;
use crate::pipeline::result::{ErrorInfo, PipelineResult};
use crate::state::JobState;
use crate::{PipelineError, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Identifier of a submitted job; increases with submission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// One URL's run through the pipeline
///
/// Owned by exactly one worker from the moment it is dequeued until it
/// reaches a terminal state.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub url: Url,
    pub state: JobState,

    /// Collector invocations, including retries
    pub attempts: u32,

    pub result: PipelineResult,
    pub error: Option<ErrorInfo>,

    /// Configuration the job was submitted under; edits to a config file
    /// after submission never reach a queued job
    pub config: Arc<Config>,

    /// Observed at stage boundaries and during retry backoff
    pub(crate) cancel: CancellationToken,

    /// Aborts the in-flight stage when the batch deadline passes
    pub(crate) abort: CancellationToken,
}

impl Job {
    /// Creates a pending job with its own cancellation tokens
    pub fn new(id: JobId, url: Url, config: Arc<Config>) -> Self {
        Self::with_tokens(
            id,
            url,
            config,
            CancellationToken::new(),
            CancellationToken::new(),
        )
    }

    pub(crate) fn with_tokens(
        id: JobId,
        url: Url,
        config: Arc<Config>,
        cancel: CancellationToken,
        abort: CancellationToken,
    ) -> Self {
        Self {
            id,
            result: PipelineResult::new(url.as_str()),
            url,
            state: JobState::Pending,
            attempts: 0,
            error: None,
            config,
            cancel,
            abort,
        }
    }

    /// Moves the job to `next`, enforcing the state machine
    pub fn transition(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        tracing::trace!("{} {} -> {}", self.id, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Snapshot handed to the aggregator
    pub fn into_record(self) -> JobRecord {
        JobRecord {
            id: self.id,
            url: self.url.to_string(),
            state: self.state,
            attempts: self.attempts,
            result: self.result,
            error: self.error,
        }
    }
}
