//! Pacer Runtime - stream scheduling, operation execution and metrics.
//!
//! This crate replays workload streams against a system under test:
//!
//! - [`InitiatedTimeSubmittingOperationRetriever`]: merges a stream's
//!   dependency and non-dependency operations by timestamp and reports the
//!   initiated time of every dependency operation
//! - [`StreamSchedulingThread`]: feeds one stream into an executor, then
//!   drains in-flight work
//! - [`SameThreadOperationExecutor`]: runs operations inline, with guaranteed
//!   handler cleanup and an in-flight counter
//! - [`ThreadedQueuedMetricsService`]: a single consumer thread owning all
//!   metrics state
//! - [`WorkloadRunner`]: wires the above together and supervises a run
//!
//! # Example
//!
//! ```no_run
//! use pacer_runtime::{DriverConfig, WorkloadRunner};
//! use pacer_workload::{Operation, OperationResult};
//!
//! let runner = WorkloadRunner::new(DriverConfig::new().with_stream_count(4)).unwrap();
//! let outcome = runner
//!     .run_workload(|_: &Operation| Ok(OperationResult::ok(None)))
//!     .unwrap();
//! println!("{}", outcome.results);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod coordination;
mod error;
mod executor;
mod handler;
pub mod metrics;
mod reporter;
mod retriever;
mod runner;
mod stream;

pub use config::{DriverConfig, DRAIN_POLL_INTERVAL_ENV};
pub use coordination::{CompletionTimeWriter, LocalCompletionTimeWriter};
pub use error::{
    BoxError, ConfigError, CoordinationError, DriverError, DriverResult, ExecutorError,
    HandlerError, HandlerStage, MetricsError,
};
pub use executor::{OperationExecutor, SameThreadOperationExecutor};
pub use handler::{
    ChildOperationGenerator, FnHandlerProvider, OperationHandler, OperationHandlerProvider,
};
pub use metrics::{
    MetricsManager, MetricsModel, MetricsServiceHandle, ThreadedQueuedMetricsService,
    WorkloadResultsSnapshot, WorkloadStatusSnapshot,
};
pub use reporter::{ConcurrentErrorReporter, ErrorReport};
pub use retriever::InitiatedTimeSubmittingOperationRetriever;
pub use runner::{RunOutcome, StreamOutcome, WorkloadRunner};
pub use stream::{StreamSchedulingThread, DEFAULT_DRAIN_POLL_INTERVAL};
