//! State module for tracking job progress
//!
//! # Components
//!
//! - `Stage`: the three cached pipeline stages (collect, process, analyze)
//! - `JobState`: the per-job state machine driven by the orchestrator

mod job_state;
mod stage;

pub use job_state::JobState;
pub use stage::Stage;
