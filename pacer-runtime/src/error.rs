//! Runtime error types.
//!
//! One enum per failure class: coordination failures come from the
//! completion-time writer, executor failures wrap anything that goes wrong
//! while running an operation, and metrics failures come from the metrics
//! pipeline. [`DriverError`] is what the workload runner surfaces.

use std::fmt;

use pacer_core::{Instant, StreamId};
use pacer_workload::WorkloadError;
use thiserror::Error;

/// Boxed error used as the source of wrapped failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors reported by a completion-time writer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    /// An initiated time went backwards.
    #[error("initiated time {submitted} is earlier than previously submitted {last}")]
    NonMonotonic {
        /// Last accepted initiated time.
        last: Instant,
        /// Rejected initiated time.
        submitted: Instant,
    },

    /// The completion-time service cannot accept submissions.
    #[error("completion time service unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },
}

/// Errors raised by a handler or its provider.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The system under test failed to run the operation.
    #[error("operation failed: {message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },

    /// A handler completed without producing a result report.
    #[error("handler produced no result")]
    MissingResult,

    /// The result could not be handed to metrics collection.
    #[error("metrics: {0}")]
    Metrics(#[from] MetricsError),
}

/// The step of handler execution a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStage {
    /// Acquiring a handler from the provider.
    Acquire,
    /// Running the handler.
    Run,
    /// Generating or executing child operations.
    ChildDispatch,
}

impl HandlerStage {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Acquire => "acquire",
            Self::Run => "run",
            Self::ChildDispatch => "child dispatch",
        }
    }
}

impl fmt::Display for HandlerStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while retrieving or executing operations.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Acquiring, running, or dispatching children of a handler failed.
    #[error("error retrieving or executing handler during {stage}: operation: {operation}: {source}")]
    Handler {
        /// Description of the operation being executed.
        operation: String,
        /// Where in handler execution the failure happened.
        stage: HandlerStage,
        /// The underlying failure.
        source: BoxError,
    },

    /// `next_operation` was called on a retriever with nothing left.
    #[error("operation retriever has no operation to return")]
    RetrieverExhausted,

    /// The completion-time writer rejected an initiated time.
    #[error("coordination: {0}")]
    Coordination(#[from] CoordinationError),

    /// The executor could not shut down cleanly.
    #[error("executor shutdown: {message}")]
    Shutdown {
        /// Description of the failure.
        message: String,
    },
}

/// Errors from the metrics collection pipeline.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Applying a result to the metrics model failed.
    #[error("error collecting metrics for result: {result}: {message}")]
    Measure {
        /// Description of the offending result.
        result: String,
        /// Why the result was rejected.
        message: String,
    },

    /// The metrics model could not produce a status or snapshot.
    #[error("metrics model failure: {message}")]
    Model {
        /// Description of the failure.
        message: String,
    },

    /// A second termination event arrived.
    #[error("encountered multiple termination events: first expected count {first}, second expected count {second}")]
    DuplicateTermination {
        /// Expected count from the first termination event (kept).
        first: u64,
        /// Expected count from the rejected event.
        second: u64,
    },

    /// The metrics consumer has exited; the request was not answered.
    #[error("metrics service has terminated")]
    ServiceTerminated,

    /// The metrics consumer thread could not be spawned.
    #[error("failed to spawn metrics thread: {0}")]
    Spawn(std::io::Error),

    /// The metrics consumer thread panicked.
    #[error("metrics thread panicked")]
    ThreadPanicked,
}

/// Errors from driver configuration validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid configuration '{name}': {reason}")]
pub struct ConfigError {
    /// The offending field.
    pub name: &'static str,
    /// Why it was invalid.
    pub reason: String,
}

/// Errors surfaced by the workload runner.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The workload could not be generated.
    #[error("workload: {0}")]
    Workload(#[from] WorkloadError),

    /// The metrics pipeline failed.
    #[error("metrics: {0}")]
    Metrics(#[from] MetricsError),

    /// An executor failed to shut down.
    #[error("executor: {0}")]
    Executor(#[from] ExecutorError),

    /// A stream scheduling thread could not be spawned.
    #[error("failed to spawn scheduling thread for {stream}: {source}")]
    Spawn {
        /// The stream whose thread failed to start.
        stream: StreamId,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;
