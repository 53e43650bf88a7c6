//! Output module for batch results
//!
//! This module handles:
//! - Aggregating job records into an ordered batch result
//! - Handing batches to reporters
//! - Printing batch and cache statistics

mod aggregate;
pub mod stats;
mod traits;

pub use aggregate::{aggregate, BatchResult, BatchSummary, JobRecord};
pub use stats::{print_batch_summary, print_cache_stats, LogReporter};
pub use traits::{OutputError, OutputResult, Reporter};
