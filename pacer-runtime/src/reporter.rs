//! Shared error sink.
//!
//! Every thread of a run reports failures here. A supervisor polls
//! [`ConcurrentErrorReporter::has_errors`] to decide whether to force
//! termination.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing::error;

/// A single reported error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// Component that reported the error.
    pub source: String,
    /// Error description.
    pub message: String,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}

/// Thread-safe collector of error reports. Never fails.
#[derive(Debug, Default)]
pub struct ConcurrentErrorReporter {
    reports: Mutex<Vec<ErrorReport>>,
}

impl ConcurrentErrorReporter {
    /// Creates an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error from `source`.
    pub fn report_error(&self, source: impl Into<String>, message: impl Into<String>) {
        let report = ErrorReport {
            source: source.into(),
            message: message.into(),
        };
        error!(source = %report.source, message = %report.message, "error reported");
        // A panicking reporter must not take the sink down with it.
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report);
    }

    /// Returns true if any error has been reported.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self
            .reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Returns the number of reported errors.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns a copy of every report so far, in reporting order.
    #[must_use]
    pub fn errors(&self) -> Vec<ErrorReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_starts_empty() {
        let reporter = ConcurrentErrorReporter::new();
        assert!(!reporter.has_errors());
        assert_eq!(reporter.error_count(), 0);
    }

    #[test]
    fn test_reports_keep_order() {
        let reporter = ConcurrentErrorReporter::new();
        reporter.report_error("stream-0", "first");
        reporter.report_error("metrics", "second");

        let errors = reporter.errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].to_string(), "stream-0: first");
        assert_eq!(errors[1].source, "metrics");
    }

    #[test]
    fn test_concurrent_reporting() {
        let reporter = Arc::new(ConcurrentErrorReporter::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let reporter = Arc::clone(&reporter);
                thread::spawn(move || {
                    for j in 0..25 {
                        reporter.report_error(format!("thread-{i}"), format!("error {j}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(reporter.error_count(), 200);
    }
}
