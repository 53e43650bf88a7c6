//! Job state definitions for tracking pipeline progress
//!
//! A job moves through the three active stages in order and ends in exactly
//! one terminal state.

use crate::state::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current state of a job in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    // ===== Waiting =====
    /// Job is queued and not yet picked up by a worker
    Pending,

    // ===== Active States =====
    /// Raw content is being collected
    Collecting,

    /// Collected content is being processed
    Processing,

    /// Processed data is being analyzed
    Analyzing,

    // ===== Terminal States =====
    /// All stages completed
    Succeeded,

    /// A stage failed; the job's error names the stage
    Failed,

    /// The job was cancelled or ran past its deadline
    Cancelled,
}

impl JobState {
    /// Returns true if this is a terminal state (no further processing)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Returns true while a stage of the job is executing
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Collecting | Self::Processing | Self::Analyzing)
    }

    /// The active state a job is in while running `stage`
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Collect => Self::Collecting,
            Stage::Process => Self::Processing,
            Stage::Analyze => Self::Analyzing,
        }
    }

    /// The stage executing in this state, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Collecting => Some(Stage::Collect),
            Self::Processing => Some(Stage::Process),
            Self::Analyzing => Some(Stage::Analyze),
            _ => None,
        }
    }

    /// Checks whether the state machine allows moving from `self` to `next`
    ///
    /// ```text
    /// Pending -> Collecting -> Processing -> Analyzing -> Succeeded
    ///   |            |             |            |
    ///   |            +-------------+------------+--> Failed
    ///   +------------+-------------+------------+--> Cancelled
    /// ```
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, Collecting)
                | (Collecting, Processing)
                | (Processing, Analyzing)
                | (Analyzing, Succeeded)
                | (Collecting | Processing | Analyzing, Failed)
                | (Pending | Collecting | Processing | Analyzing, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Collecting => "collecting",
            Self::Processing => "processing",
            Self::Analyzing => "analyzing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobState; 7] = [
        JobState::Pending,
        JobState::Collecting,
        JobState::Processing,
        JobState::Analyzing,
        JobState::Succeeded,
        JobState::Failed,
        JobState::Cancelled,
    ];

    #[test]
    fn test_happy_path_transitions() {
        assert!(JobState::Pending.can_transition_to(JobState::Collecting));
        assert!(JobState::Collecting.can_transition_to(JobState::Processing));
        assert!(JobState::Processing.can_transition_to(JobState::Analyzing));
        assert!(JobState::Analyzing.can_transition_to(JobState::Succeeded));
    }

    #[test]
    fn test_failed_only_from_active_states() {
        for state in ALL {
            assert_eq!(
                state.can_transition_to(JobState::Failed),
                state.is_active(),
                "{state} -> failed"
            );
        }
    }

    #[test]
    fn test_cancelled_from_pending_or_active() {
        for state in ALL {
            let expected = state == JobState::Pending || state.is_active();
            assert_eq!(state.can_transition_to(JobState::Cancelled), expected);
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_no_stage_skipping() {
        assert!(!JobState::Pending.can_transition_to(JobState::Processing));
        assert!(!JobState::Collecting.can_transition_to(JobState::Succeeded));
        assert!(!JobState::Pending.can_transition_to(JobState::Succeeded));
    }

    #[test]
    fn test_stage_mapping() {
        for stage in Stage::ALL {
            assert_eq!(JobState::for_stage(stage).stage(), Some(stage));
        }
        assert_eq!(JobState::Pending.stage(), None);
    }
}
