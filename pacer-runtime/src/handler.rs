//! Operation handlers.
//!
//! A handler runs one operation against the system under test. The executor
//! drives every handler through the same sequence: acquire, run, read the
//! result, clean up. Cleanup always happens, whatever the outcome.

use std::sync::Arc;
use std::thread;

use pacer_core::{Duration, Instant};
use pacer_workload::{Operation, OperationResult, OperationResultReport};
use tracing::trace;

use crate::error::HandlerError;
use crate::metrics::MetricsServiceHandle;

/// Runs a single operation.
pub trait OperationHandler: Send {
    /// Executes the operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation could not be run or its result could
    /// not be reported.
    fn run(&mut self) -> Result<(), HandlerError>;

    /// Returns the result of a successful run.
    fn result(&self) -> Option<&OperationResultReport>;

    /// Releases the handler's resources. Called exactly once.
    fn cleanup(&mut self);
}

/// Creates a handler for each operation.
pub trait OperationHandlerProvider: Send + Sync {
    /// Takes ownership of `operation` and returns a handler ready to run it.
    ///
    /// # Errors
    ///
    /// Returns an error if no handler can be created for the operation.
    fn acquire_handler(
        &self,
        operation: Operation,
    ) -> Result<Box<dyn OperationHandler>, HandlerError>;
}

/// Derives follow-up operations from a completed one.
pub trait ChildOperationGenerator: Send + Sync {
    /// Returns the operations to run after `completed`, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the follow-up operations cannot be derived.
    fn child_operations(
        &self,
        completed: &OperationResultReport,
    ) -> Result<Vec<Operation>, HandlerError>;
}

/// Builds handlers around a function that executes an operation against the
/// system under test.
///
/// Each handler sleeps until the operation's scheduled start time, times the
/// call, and submits the result to metrics collection. The function returns
/// `Err` when the operation could not be run at all; a run the system
/// rejected is an `Ok` result with a non-zero code.
pub struct FnHandlerProvider<F> {
    function: Arc<F>,
    metrics: MetricsServiceHandle,
}

impl<F> FnHandlerProvider<F>
where
    F: Fn(&Operation) -> Result<OperationResult, String> + Send + Sync + 'static,
{
    /// Creates a provider that runs `function` and reports to `metrics`.
    #[must_use]
    pub fn new(function: F, metrics: MetricsServiceHandle) -> Self {
        Self {
            function: Arc::new(function),
            metrics,
        }
    }
}

impl<F> std::fmt::Debug for FnHandlerProvider<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandlerProvider").finish_non_exhaustive()
    }
}

impl<F> OperationHandlerProvider for FnHandlerProvider<F>
where
    F: Fn(&Operation) -> Result<OperationResult, String> + Send + Sync + 'static,
{
    fn acquire_handler(
        &self,
        operation: Operation,
    ) -> Result<Box<dyn OperationHandler>, HandlerError> {
        Ok(Box::new(FnHandler {
            operation: Some(operation),
            function: Arc::clone(&self.function),
            metrics: self.metrics.clone(),
            report: None,
        }))
    }
}

struct FnHandler<F> {
    operation: Option<Operation>,
    function: Arc<F>,
    metrics: MetricsServiceHandle,
    report: Option<OperationResultReport>,
}

impl<F> OperationHandler for FnHandler<F>
where
    F: Fn(&Operation) -> Result<OperationResult, String> + Send + Sync,
{
    fn run(&mut self) -> Result<(), HandlerError> {
        let Some(operation) = self.operation.take() else {
            return Err(HandlerError::Failed {
                message: "handler has already run".to_string(),
            });
        };

        let wait = operation.scheduled_start_time().greater_by(Instant::now());
        if wait.gt(Duration::ZERO) {
            thread::sleep(wait.to_std());
        }

        let actual_start_time = Instant::now();
        let started = std::time::Instant::now();
        let result = (self.function)(&operation);
        let run_duration = Duration::from(started.elapsed());
        let result = result.map_err(|message| HandlerError::Failed { message })?;

        let report = OperationResultReport {
            operation,
            result,
            actual_start_time,
            run_duration,
        };
        trace!(report = %report, "operation completed");
        self.metrics.submit_result(report.clone())?;
        self.report = Some(report);
        Ok(())
    }

    fn result(&self) -> Option<&OperationResultReport> {
        self.report.as_ref()
    }

    fn cleanup(&mut self) {
        self.operation = None;
        self.report = None;
    }
}
