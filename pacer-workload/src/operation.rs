//! Operation model for workload replay.
//!
//! An operation carries two notions of time: an immutable logical `timestamp`
//! that orders it causally against every other operation, and a mutable
//! `scheduled_start_time` that says when on the wall clock it should run.
//! Time remapping rewrites the latter and never touches the former.

use std::fmt;

use bytes::Bytes;
use pacer_core::{Duration, Instant, OperationId};

/// A single operation in the workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Unique operation ID for correlation.
    pub id: OperationId,
    /// Operation type name, used to group metrics.
    pub kind: &'static str,
    /// Timestamp of the latest dependency operation this one must observe.
    pub dependency_time: Instant,
    /// Opaque operation parameters, interpreted by the system under test.
    pub payload: Bytes,
    timestamp: Instant,
    scheduled_start_time: Instant,
}

impl Operation {
    /// Creates a new operation scheduled to start at its own timestamp.
    #[must_use]
    pub const fn new(id: OperationId, kind: &'static str, timestamp: Instant) -> Self {
        Self {
            id,
            kind,
            dependency_time: Instant::from_nano(0),
            payload: Bytes::new(),
            timestamp,
            scheduled_start_time: timestamp,
        }
    }

    /// Sets the dependency time.
    #[must_use]
    pub const fn with_dependency_time(mut self, dependency_time: Instant) -> Self {
        self.dependency_time = dependency_time;
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Bytes) -> Self {
        self.payload = payload;
        self
    }

    /// Sets the scheduled start time.
    #[must_use]
    pub const fn with_scheduled_start_time(mut self, scheduled_start_time: Instant) -> Self {
        self.scheduled_start_time = scheduled_start_time;
        self
    }

    /// Returns the logical timestamp (causal ordering key).
    #[must_use]
    pub const fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Returns the wall-clock time this operation should start at.
    #[must_use]
    pub const fn scheduled_start_time(&self) -> Instant {
        self.scheduled_start_time
    }

    /// Rewrites the wall-clock start time.
    pub fn set_scheduled_start_time(&mut self, scheduled_start_time: Instant) {
        self.scheduled_start_time = scheduled_start_time;
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] timestamp={} scheduled_start={} dependency={} payload={}B",
            self.id,
            self.kind,
            self.timestamp,
            self.scheduled_start_time,
            self.dependency_time,
            self.payload.len()
        )
    }
}

/// Result of an operation execution, as returned by the system under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    /// Result code. Zero is success, anything else an error reported by the
    /// system under test.
    pub code: i32,
    /// Optional result value.
    pub value: Option<Bytes>,
}

impl OperationResult {
    /// A successful result carrying `value`.
    #[must_use]
    pub const fn ok(value: Option<Bytes>) -> Self {
        Self { code: 0, value }
    }

    /// A failed result with the given non-zero code.
    #[must_use]
    pub const fn error(code: i32) -> Self {
        Self { code, value: None }
    }

    /// Returns true if this result indicates success.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// Immutable record of one completed execution, handed to metrics collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResultReport {
    /// The operation that ran.
    pub operation: Operation,
    /// What the system under test returned.
    pub result: OperationResult,
    /// When the handler actually started running the operation.
    pub actual_start_time: Instant,
    /// How long the operation took to run.
    pub run_duration: Duration,
}

impl OperationResultReport {
    /// Returns how far behind its scheduled start the operation began.
    ///
    /// Negative when the operation started early.
    #[must_use]
    pub const fn start_delay(&self) -> Duration {
        self.actual_start_time
            .greater_by(self.operation.scheduled_start_time())
    }
}

impl fmt::Display for OperationResultReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} code={} actual_start={} run_duration={}us",
            self.operation,
            self.result.code,
            self.actual_start_time,
            self.run_duration.as_micro()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduled_start_defaults_to_timestamp() {
        let mut op = Operation::new(OperationId::new(1), "read", Instant::from_milli(100));
        assert_eq!(op.scheduled_start_time(), Instant::from_milli(100));

        op.set_scheduled_start_time(Instant::from_milli(5_000));
        assert_eq!(op.scheduled_start_time(), Instant::from_milli(5_000));
        assert_eq!(op.timestamp(), Instant::from_milli(100));
    }

    #[test]
    fn test_operation_display_mentions_id_and_kind() {
        let op = Operation::new(OperationId::new(7), "write", Instant::from_milli(3))
            .with_payload(Bytes::from_static(b"abc"));
        let text = op.to_string();
        assert!(text.contains("op-7"));
        assert!(text.contains("[write]"));
        assert!(text.contains("payload=3B"));
    }

    #[test]
    fn test_result_report_start_delay() {
        let op = Operation::new(OperationId::new(1), "read", Instant::from_milli(10))
            .with_scheduled_start_time(Instant::from_milli(1_000));
        let report = OperationResultReport {
            operation: op,
            result: OperationResult::ok(None),
            actual_start_time: Instant::from_milli(1_004),
            run_duration: Duration::from_micro(250),
        };

        assert!(report.result.is_ok());
        assert_eq!(report.start_delay(), Duration::from_milli(4));
        assert!(!OperationResult::error(3).is_ok());
    }
}
