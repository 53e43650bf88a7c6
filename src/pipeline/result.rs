//! Per-job outcome types

use crate::pipeline::collaborators::{AnalysisResult, CollectionResult, ProcessedData};
use crate::state::Stage;
use crate::PipelineError;
use serde::Serialize;
use std::time::Duration;

/// One flag per stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageFlags {
    pub collect: bool,
    pub process: bool,
    pub analyze: bool,
}

impl StageFlags {
    pub fn get(&self, stage: Stage) -> bool {
        match stage {
            Stage::Collect => self.collect,
            Stage::Process => self.process,
            Stage::Analyze => self.analyze,
        }
    }

    pub fn set(&mut self, stage: Stage) {
        match stage {
            Stage::Collect => self.collect = true,
            Stage::Process => self.process = true,
            Stage::Analyze => self.analyze = true,
        }
    }

    /// Number of flags set
    pub fn count(&self) -> u64 {
        Stage::ALL.iter().filter(|stage| self.get(**stage)).count() as u64
    }
}

/// Everything a job produced, including partial output of failed jobs
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineResult {
    pub url: String,
    pub collected: Option<CollectionResult>,
    pub processed: Option<ProcessedData>,
    pub analyzed: Option<AnalysisResult>,

    /// Stages served from the cache
    pub cache_hits: StageFlags,

    /// Stages the job started, whether they finished or not
    pub attempted: StageFlags,

    /// Wall time from job start to its terminal state
    pub duration: Duration,
}

impl PipelineResult {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Coarse classification of a job error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Collection,
    Processing,
    Analysis,
    /// Job deadline or batch timeout exceeded
    Timeout,
    Cancelled,
    Internal,
}

/// Why a job did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,

    /// Stage that was running when the job stopped, if any
    pub stage: Option<Stage>,

    pub message: String,

    /// Whether the underlying failure was classified as transient
    pub transient: bool,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, stage: Option<Stage>, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage,
            message: message.into(),
            transient: false,
        }
    }

    /// Classifies a pipeline error raised while `stage` was running
    pub fn from_error(err: &PipelineError, stage: Option<Stage>) -> Self {
        let (kind, transient) = match err {
            PipelineError::Collection(e) => (ErrorKind::Collection, e.is_transient()),
            PipelineError::Processing(_) => (ErrorKind::Processing, false),
            PipelineError::Analysis(_) => (ErrorKind::Analysis, false),
            PipelineError::Timeout { .. } => (ErrorKind::Timeout, false),
            PipelineError::Cancelled { .. } => (ErrorKind::Cancelled, false),
            _ => (ErrorKind::Internal, false),
        };

        Self {
            kind,
            stage,
            message: err.to_string(),
            transient,
        }
    }
}
