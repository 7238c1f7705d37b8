//! Events consumed by the metrics collection thread.

use pacer_workload::OperationResultReport;
use tokio::sync::oneshot;

use crate::error::MetricsError;
use crate::metrics::manager::{WorkloadResultsSnapshot, WorkloadStatusSnapshot};

/// Reply cell for a status request.
pub type StatusPromise = oneshot::Sender<Result<WorkloadStatusSnapshot, MetricsError>>;
/// Reply cell for a snapshot request.
pub type SnapshotPromise = oneshot::Sender<Result<WorkloadResultsSnapshot, MetricsError>>;

/// A message to the metrics collection thread.
#[derive(Debug)]
pub enum MetricsCollectionEvent {
    /// A completed operation to be measured.
    SubmitResult(OperationResultReport),
    /// Request for the current workload status.
    Status(StatusPromise),
    /// Request for a full results snapshot.
    Snapshot(SnapshotPromise),
    /// The total number of results that will ever be submitted.
    Termination {
        /// Number of `SubmitResult` events to process before stopping.
        expected_event_count: u64,
    },
}

impl MetricsCollectionEvent {
    /// Short name of the event kind, for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SubmitResult(_) => "submit_result",
            Self::Status(_) => "status",
            Self::Snapshot(_) => "snapshot",
            Self::Termination { .. } => "termination",
        }
    }
}
