//! Metrics model.
//!
//! [`MetricsModel`] is the state the metrics thread owns. [`MetricsManager`]
//! is the default model: per operation kind it counts results and errors and
//! records run latencies in an HDR histogram.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;

use hdrhistogram::Histogram;
use pacer_core::{Duration, Instant};
use pacer_workload::OperationResultReport;

use crate::error::MetricsError;

/// Significant figures kept by every latency histogram.
const SIGNIFICANT_FIGURES: u8 = 3;

/// Mutable metrics state, owned by exactly one thread.
pub trait MetricsModel: Send {
    /// Applies one completed operation.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Measure`] if the report cannot be recorded.
    fn measure(&mut self, report: &OperationResultReport) -> Result<(), MetricsError>;

    /// Returns a lightweight progress summary.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Model`] if the status cannot be computed.
    fn status(&self) -> Result<WorkloadStatusSnapshot, MetricsError>;

    /// Returns the full per-kind results.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Model`] if the snapshot cannot be computed.
    fn snapshot(&self) -> Result<WorkloadResultsSnapshot, MetricsError>;
}

/// Progress summary of a running workload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkloadStatusSnapshot {
    /// Results measured so far.
    pub operation_count: u64,
    /// Results with a non-zero result code.
    pub error_count: u64,
    /// Operations per second between the first start and the latest finish.
    pub throughput: f64,
}

impl fmt::Display for WorkloadStatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "operations={} errors={} throughput={:.1} ops/sec",
            self.operation_count, self.error_count, self.throughput
        )
    }
}

/// Latency summary of one operation kind. Latencies are in microseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationMetricsSnapshot {
    /// Operation kind.
    pub kind: &'static str,
    /// Results measured.
    pub count: u64,
    /// Results with a non-zero result code.
    pub error_count: u64,
    /// Median run latency.
    pub latency_p50_us: u64,
    /// 95th percentile run latency.
    pub latency_p95_us: u64,
    /// 99th percentile run latency.
    pub latency_p99_us: u64,
    /// Maximum run latency.
    pub latency_max_us: u64,
    /// Largest delay between scheduled and actual start.
    pub max_start_delay: Duration,
}

/// Full results of a workload.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadResultsSnapshot {
    /// Results measured.
    pub operation_count: u64,
    /// Results with a non-zero result code.
    pub error_count: u64,
    /// Earliest actual start time seen.
    pub start_time: Option<Instant>,
    /// Latest finish time seen.
    pub latest_finish_time: Option<Instant>,
    /// Operations per second over the measured interval.
    pub throughput: f64,
    /// Per-kind results, sorted by kind.
    pub operations: Vec<OperationMetricsSnapshot>,
}

impl WorkloadResultsSnapshot {
    /// Returns the span between the first start and the latest finish.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        match (self.start_time, self.latest_finish_time) {
            (Some(start), Some(finish)) => finish.greater_by(start),
            _ => Duration::ZERO,
        }
    }

    /// Returns the results of one operation kind.
    #[must_use]
    pub fn operation(&self, kind: &str) -> Option<&OperationMetricsSnapshot> {
        self.operations.iter().find(|op| op.kind == kind)
    }
}

impl fmt::Display for WorkloadResultsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Workload Results ===")?;
        writeln!(
            f,
            "Operations: {} total, {} errors",
            self.operation_count, self.error_count
        )?;
        writeln!(f, "Duration: {}", self.total_duration())?;
        writeln!(f, "Throughput: {:.0} ops/sec", self.throughput)?;
        for op in &self.operations {
            writeln!(
                f,
                "  {}: count={} errors={} p50={}us p95={}us p99={}us max={}us max_start_delay={}us",
                op.kind,
                op.count,
                op.error_count,
                op.latency_p50_us,
                op.latency_p95_us,
                op.latency_p99_us,
                op.latency_max_us,
                op.max_start_delay.as_micro()
            )?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct OperationMetrics {
    count: u64,
    error_count: u64,
    run_latency_us: Histogram<u64>,
    max_start_delay: Duration,
}

impl OperationMetrics {
    fn new() -> Result<Self, MetricsError> {
        let run_latency_us =
            Histogram::new(SIGNIFICANT_FIGURES).map_err(|e| MetricsError::Model {
                message: format!("failed to create histogram: {e}"),
            })?;
        Ok(Self {
            count: 0,
            error_count: 0,
            run_latency_us,
            max_start_delay: Duration::ZERO,
        })
    }

    fn snapshot(&self, kind: &'static str) -> OperationMetricsSnapshot {
        OperationMetricsSnapshot {
            kind,
            count: self.count,
            error_count: self.error_count,
            latency_p50_us: self.run_latency_us.value_at_quantile(0.50),
            latency_p95_us: self.run_latency_us.value_at_quantile(0.95),
            latency_p99_us: self.run_latency_us.value_at_quantile(0.99),
            latency_max_us: self.run_latency_us.max(),
            max_start_delay: self.max_start_delay,
        }
    }
}

/// Default metrics model.
#[derive(Debug, Default)]
pub struct MetricsManager {
    operations: BTreeMap<&'static str, OperationMetrics>,
    operation_count: u64,
    error_count: u64,
    start_time: Option<Instant>,
    latest_finish_time: Option<Instant>,
}

impl MetricsManager {
    /// Creates an empty metrics manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::cast_precision_loss)]
    fn throughput(&self) -> f64 {
        let (Some(start), Some(finish)) = (self.start_time, self.latest_finish_time) else {
            return 0.0;
        };
        let elapsed_ns = finish.greater_by(start).as_nano();
        if elapsed_ns <= 0 {
            return 0.0;
        }
        self.operation_count as f64 / (elapsed_ns as f64 / 1_000_000_000.0)
    }
}

impl MetricsModel for MetricsManager {
    fn measure(&mut self, report: &OperationResultReport) -> Result<(), MetricsError> {
        if report.run_duration.lt(Duration::ZERO) {
            return Err(MetricsError::Measure {
                result: report.to_string(),
                message: format!("negative run duration {}ns", report.run_duration.as_nano()),
            });
        }
        let run_us = report.run_duration.as_micro().unsigned_abs();

        let kind = report.operation.kind;
        let metrics = match self.operations.entry(kind) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(OperationMetrics::new()?),
        };
        metrics
            .run_latency_us
            .record(run_us)
            .map_err(|e| MetricsError::Measure {
                result: report.to_string(),
                message: e.to_string(),
            })?;

        metrics.count += 1;
        metrics.max_start_delay = Duration::max(metrics.max_start_delay, report.start_delay());
        self.operation_count += 1;
        if !report.result.is_ok() {
            metrics.error_count += 1;
            self.error_count += 1;
        }

        let start = report.actual_start_time;
        let finish = start.plus(report.run_duration);
        self.start_time = Some(self.start_time.map_or(start, |s| s.min(start)));
        self.latest_finish_time = Some(self.latest_finish_time.map_or(finish, |f| f.max(finish)));
        Ok(())
    }

    fn status(&self) -> Result<WorkloadStatusSnapshot, MetricsError> {
        Ok(WorkloadStatusSnapshot {
            operation_count: self.operation_count,
            error_count: self.error_count,
            throughput: self.throughput(),
        })
    }

    fn snapshot(&self) -> Result<WorkloadResultsSnapshot, MetricsError> {
        Ok(WorkloadResultsSnapshot {
            operation_count: self.operation_count,
            error_count: self.error_count,
            start_time: self.start_time,
            latest_finish_time: self.latest_finish_time,
            throughput: self.throughput(),
            operations: self
                .operations
                .iter()
                .map(|(kind, metrics)| metrics.snapshot(*kind))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use pacer_core::OperationId;
    use pacer_workload::{Operation, OperationResult};

    use super::*;

    fn report(id: u64, kind: &'static str, start_ms: i64, run_us: i64, code: i32) -> OperationResultReport {
        let operation = Operation::new(OperationId::new(id), kind, Instant::from_milli(start_ms));
        OperationResultReport {
            operation,
            result: if code == 0 {
                OperationResult::ok(None)
            } else {
                OperationResult::error(code)
            },
            actual_start_time: Instant::from_milli(start_ms),
            run_duration: Duration::from_micro(run_us),
        }
    }

    #[test]
    fn test_empty_manager() {
        let manager = MetricsManager::new();
        let status = manager.status().unwrap();
        assert_eq!(status.operation_count, 0);
        assert!((status.throughput - 0.0).abs() < f64::EPSILON);

        let snapshot = manager.snapshot().unwrap();
        assert!(snapshot.operations.is_empty());
        assert_eq!(snapshot.total_duration(), Duration::ZERO);
    }

    #[test]
    fn test_counts_per_kind() {
        let mut manager = MetricsManager::new();
        manager.measure(&report(1, "read", 0, 100, 0)).unwrap();
        manager.measure(&report(2, "read", 1, 300, 0)).unwrap();
        manager.measure(&report(3, "write", 2, 500, 7)).unwrap();

        let snapshot = manager.snapshot().unwrap();
        assert_eq!(snapshot.operation_count, 3);
        assert_eq!(snapshot.error_count, 1);

        let reads = snapshot.operation("read").unwrap();
        assert_eq!(reads.count, 2);
        assert_eq!(reads.error_count, 0);
        assert!(reads.latency_max_us >= 300);

        let writes = snapshot.operation("write").unwrap();
        assert_eq!(writes.count, 1);
        assert_eq!(writes.error_count, 1);
        assert_eq!(snapshot.operations[0].kind, "read");
    }

    #[test]
    fn test_throughput_over_measured_interval() {
        let mut manager = MetricsManager::new();
        // Four operations spanning exactly two seconds.
        manager.measure(&report(1, "read", 0, 0, 0)).unwrap();
        manager.measure(&report(2, "read", 500, 0, 0)).unwrap();
        manager.measure(&report(3, "read", 1_000, 0, 0)).unwrap();
        manager.measure(&report(4, "read", 2_000, 0, 0)).unwrap();

        let status = manager.status().unwrap();
        assert!((status.throughput - 2.0).abs() < 1e-9);

        let snapshot = manager.snapshot().unwrap();
        assert_eq!(snapshot.total_duration(), Duration::from_seconds(2));
    }

    #[test]
    fn test_negative_duration_rejected() {
        let mut manager = MetricsManager::new();
        let err = manager.measure(&report(1, "read", 0, -5, 0)).unwrap_err();
        assert!(matches!(err, MetricsError::Measure { .. }));
        assert!(err.to_string().contains("op-1"));
        assert_eq!(manager.status().unwrap().operation_count, 0);
    }

    #[test]
    fn test_results_display() {
        let mut manager = MetricsManager::new();
        manager.measure(&report(1, "write", 0, 250, 0)).unwrap();
        let text = manager.snapshot().unwrap().to_string();
        assert!(text.contains("Operations: 1 total, 0 errors"));
        assert!(text.contains("write: count=1"));
    }
}
