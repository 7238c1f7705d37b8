//! Metrics collection pipeline.

mod event;
mod manager;
mod service;

pub use event::{MetricsCollectionEvent, SnapshotPromise, StatusPromise};
pub use manager::{
    MetricsManager, MetricsModel, OperationMetricsSnapshot, WorkloadResultsSnapshot,
    WorkloadStatusSnapshot,
};
pub use service::{MetricsServiceHandle, ThreadedQueuedMetricsService};
