//! Reporter trait and error types
//!
//! The core hands every finished [`BatchResult`] to a reporter. Rendering
//! formats live outside this crate; [`LogReporter`](crate::output::LogReporter)
//! is the only built-in.

use crate::output::BatchResult;
use thiserror::Error;

/// Errors that can occur while reporting a batch
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Consumer of finished batches
pub trait Reporter: Send + Sync {
    /// Reports one batch
    ///
    /// # Arguments
    ///
    /// * `batch` - The aggregated batch, jobs in submission order
    fn report(&self, batch: &BatchResult) -> OutputResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::aggregate;
    use chrono::Utc;
    use std::sync::Mutex;

    /// Keeps every reported batch as JSON
    #[derive(Default)]
    struct CapturingReporter {
        reports: Mutex<Vec<serde_json::Value>>,
    }

    impl Reporter for CapturingReporter {
        fn report(&self, batch: &BatchResult) -> OutputResult<()> {
            let value = serde_json::to_value(batch)?;
            self.reports
                .lock()
                .map_err(|_| OutputError::Write("lock poisoned".to_string()))?
                .push(value);
            Ok(())
        }
    }

    #[test]
    fn test_reporter_receives_batch() {
        let reporter = CapturingReporter::default();
        let now = Utc::now();

        reporter.report(&aggregate(Vec::new(), now, now)).unwrap();

        let reports = reporter.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0]["summary"]["total"], 0);
    }
}
