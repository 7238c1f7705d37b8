//! Operation executors.
//!
//! [`SameThreadOperationExecutor`] runs each operation to completion on the
//! caller's thread. The in-flight counter covers the whole of an execution,
//! child operations included, and is decremented only after the handler has
//! been cleaned up.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use pacer_core::{Duration, OperationId};
use pacer_workload::Operation;
use tracing::{debug, info};

use crate::error::{ExecutorError, HandlerError, HandlerStage};
use crate::handler::{ChildOperationGenerator, OperationHandler, OperationHandlerProvider};

/// Executes operations handed over by a scheduling thread.
pub trait OperationExecutor: Send + Sync {
    /// Executes `operation`. May block the caller to apply backpressure.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Handler`] if acquiring, running, or
    /// dispatching children of the handler fails.
    fn execute(&self, operation: Operation) -> Result<(), ExecutorError>;

    /// Returns the number of operations started but not yet completed.
    fn uncompleted_operation_handler_count(&self) -> u64;

    /// Stops the executor, waiting at most `timeout` for in-flight work.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Shutdown`] if the executor cannot stop cleanly.
    fn shutdown(&self, timeout: Duration) -> Result<(), ExecutorError>;
}

/// Decrements the in-flight counter when dropped.
struct InFlightGuard<'a>(&'a AtomicU64);

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a AtomicU64) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Cleans up the handler when dropped.
struct CleanupGuard(Box<dyn OperationHandler>);

impl Deref for CleanupGuard {
    type Target = dyn OperationHandler;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl DerefMut for CleanupGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.0.cleanup();
    }
}

/// Runs operations synchronously on the calling thread.
pub struct SameThreadOperationExecutor {
    provider: Arc<dyn OperationHandlerProvider>,
    child_generator: Option<Arc<dyn ChildOperationGenerator>>,
    in_flight: AtomicU64,
    shut_down: Mutex<bool>,
}

impl SameThreadOperationExecutor {
    /// Creates an executor that acquires handlers from `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn OperationHandlerProvider>) -> Self {
        Self {
            provider,
            child_generator: None,
            in_flight: AtomicU64::new(0),
            shut_down: Mutex::new(false),
        }
    }

    /// Runs the operations `generator` derives from each completed operation
    /// through this executor.
    #[must_use]
    pub fn with_child_generator(mut self, generator: Arc<dyn ChildOperationGenerator>) -> Self {
        self.child_generator = Some(generator);
        self
    }

    fn handler_error(
        id: OperationId,
        kind: &'static str,
        stage: HandlerStage,
        source: impl Into<crate::error::BoxError>,
    ) -> ExecutorError {
        ExecutorError::Handler {
            operation: format!("{id} [{kind}]"),
            stage,
            source: source.into(),
        }
    }
}

impl std::fmt::Debug for SameThreadOperationExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SameThreadOperationExecutor")
            .field("in_flight", &self.in_flight)
            .field("has_child_generator", &self.child_generator.is_some())
            .finish_non_exhaustive()
    }
}

impl OperationExecutor for SameThreadOperationExecutor {
    fn execute(&self, operation: Operation) -> Result<(), ExecutorError> {
        // Declared before the handler so cleanup runs before the decrement.
        let _in_flight = InFlightGuard::enter(&self.in_flight);

        let id = operation.id;
        let kind = operation.kind;
        let handler = self
            .provider
            .acquire_handler(operation)
            .map_err(|e| Self::handler_error(id, kind, HandlerStage::Acquire, e))?;
        let mut handler = CleanupGuard(handler);

        handler
            .run()
            .map_err(|e| Self::handler_error(id, kind, HandlerStage::Run, e))?;

        let Some(generator) = &self.child_generator else {
            return Ok(());
        };
        let children = handler
            .result()
            .ok_or(HandlerError::MissingResult)
            .and_then(|report| generator.child_operations(report))
            .map_err(|e| Self::handler_error(id, kind, HandlerStage::ChildDispatch, e))?;
        for child in children {
            self.execute(child)
                .map_err(|e| Self::handler_error(id, kind, HandlerStage::ChildDispatch, e))?;
        }
        Ok(())
    }

    fn uncompleted_operation_handler_count(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }

    fn shutdown(&self, timeout: Duration) -> Result<(), ExecutorError> {
        let mut shut_down = self.shut_down.lock().unwrap_or_else(PoisonError::into_inner);
        if *shut_down {
            debug!("executor already shut down");
            return Ok(());
        }
        // Nothing runs off the caller's thread, so there is nothing to wait for.
        *shut_down = true;
        info!(timeout_ms = timeout.as_milli(), "same-thread executor shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use pacer_core::Instant;
    use pacer_workload::{OperationResult, OperationResultReport};

    use super::*;

    /// Records every lifecycle call, and the in-flight count seen at cleanup.
    #[derive(Debug, Default)]
    struct Journal {
        events: Mutex<Vec<String>>,
    }

    impl Journal {
        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    struct ScriptedHandler {
        operation: Operation,
        journal: Arc<Journal>,
        executor_in_flight: Arc<dyn Fn() -> u64 + Send + Sync>,
        fail_run: bool,
        report: Option<OperationResultReport>,
    }

    impl OperationHandler for ScriptedHandler {
        fn run(&mut self) -> Result<(), HandlerError> {
            self.journal.push(format!("run {}", self.operation.id));
            if self.fail_run {
                return Err(HandlerError::Failed {
                    message: "scripted failure".to_string(),
                });
            }
            self.report = Some(OperationResultReport {
                operation: self.operation.clone(),
                result: OperationResult::ok(None),
                actual_start_time: Instant::from_milli(0),
                run_duration: Duration::from_micro(10),
            });
            Ok(())
        }

        fn result(&self) -> Option<&OperationResultReport> {
            self.report.as_ref()
        }

        fn cleanup(&mut self) {
            self.journal.push(format!(
                "cleanup {} in_flight={}",
                self.operation.id,
                (self.executor_in_flight)()
            ));
        }
    }

    struct ScriptedProvider {
        journal: Arc<Journal>,
        fail_acquire: bool,
        fail_run: bool,
        in_flight: Mutex<Option<Arc<dyn Fn() -> u64 + Send + Sync>>>,
    }

    impl ScriptedProvider {
        fn new(journal: Arc<Journal>) -> Self {
            Self {
                journal,
                fail_acquire: false,
                fail_run: false,
                in_flight: Mutex::new(None),
            }
        }
    }

    impl OperationHandlerProvider for ScriptedProvider {
        fn acquire_handler(
            &self,
            operation: Operation,
        ) -> Result<Box<dyn OperationHandler>, HandlerError> {
            if self.fail_acquire {
                return Err(HandlerError::Failed {
                    message: "no handler".to_string(),
                });
            }
            self.journal.push(format!("acquire {}", operation.id));
            let executor_in_flight: Arc<dyn Fn() -> u64 + Send + Sync> =
                match self.in_flight.lock().unwrap().clone() {
                    Some(observe) => observe,
                    None => Arc::new(|| 0),
                };
            Ok(Box::new(ScriptedHandler {
                operation,
                journal: Arc::clone(&self.journal),
                executor_in_flight,
                fail_run: self.fail_run,
                report: None,
            }))
        }
    }

    /// Emits one child per operation below id 100, with id + 100.
    struct OneChild;

    impl ChildOperationGenerator for OneChild {
        fn child_operations(
            &self,
            completed: &OperationResultReport,
        ) -> Result<Vec<Operation>, HandlerError> {
            let id = completed.operation.id.get();
            if id >= 100 {
                return Ok(Vec::new());
            }
            Ok(vec![Operation::new(
                OperationId::new(id + 100),
                "child",
                completed.operation.timestamp(),
            )])
        }
    }

    fn op(id: u64) -> Operation {
        Operation::new(OperationId::new(id), "read", Instant::from_milli(0))
    }

    fn observed_executor(
        provider: ScriptedProvider,
        child: Option<Arc<dyn ChildOperationGenerator>>,
    ) -> Arc<SameThreadOperationExecutor> {
        let provider = Arc::new(provider);
        let mut executor = SameThreadOperationExecutor::new(provider.clone());
        if let Some(child) = child {
            executor = executor.with_child_generator(child);
        }
        let executor = Arc::new(executor);
        let weak = Arc::downgrade(&executor);
        *provider.in_flight.lock().unwrap() = Some(Arc::new(move || {
            weak.upgrade()
                .map_or(0, |e| e.uncompleted_operation_handler_count())
        }));
        executor
    }

    #[test]
    fn test_lifecycle_order_and_counter() {
        let journal = Arc::new(Journal::default());
        let executor = observed_executor(ScriptedProvider::new(journal.clone()), None);

        executor.execute(op(1)).unwrap();

        assert_eq!(
            journal.events(),
            vec!["acquire op-1", "run op-1", "cleanup op-1 in_flight=1"]
        );
        assert_eq!(executor.uncompleted_operation_handler_count(), 0);
    }

    #[test]
    fn test_run_failure_still_cleans_up() {
        let journal = Arc::new(Journal::default());
        let mut provider = ScriptedProvider::new(journal.clone());
        provider.fail_run = true;
        let executor = observed_executor(provider, None);

        let err = executor.execute(op(7)).unwrap_err();
        match &err {
            ExecutorError::Handler {
                operation, stage, ..
            } => {
                assert_eq!(operation, "op-7 [read]");
                assert_eq!(*stage, HandlerStage::Run);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(journal.events().last().unwrap(), "cleanup op-7 in_flight=1");
        assert_eq!(executor.uncompleted_operation_handler_count(), 0);
    }

    #[test]
    fn test_acquire_failure_restores_counter() {
        let journal = Arc::new(Journal::default());
        let mut provider = ScriptedProvider::new(journal.clone());
        provider.fail_acquire = true;
        let executor = observed_executor(provider, None);

        let err = executor.execute(op(3)).unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::Handler {
                stage: HandlerStage::Acquire,
                ..
            }
        ));
        assert!(journal.events().is_empty());
        assert_eq!(executor.uncompleted_operation_handler_count(), 0);
    }

    #[test]
    fn test_children_run_through_same_executor() {
        let journal = Arc::new(Journal::default());
        let executor = observed_executor(
            ScriptedProvider::new(journal.clone()),
            Some(Arc::new(OneChild)),
        );

        executor.execute(op(1)).unwrap();

        assert_eq!(
            journal.events(),
            vec![
                "acquire op-1",
                "run op-1",
                "acquire op-101",
                "run op-101",
                "cleanup op-101 in_flight=2",
                "cleanup op-1 in_flight=1",
            ]
        );
        assert_eq!(executor.uncompleted_operation_handler_count(), 0);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let journal = Arc::new(Journal::default());
        let executor = observed_executor(ScriptedProvider::new(journal), None);

        executor.shutdown(Duration::from_seconds(1)).unwrap();
        executor.shutdown(Duration::from_seconds(1)).unwrap();
    }

    #[test]
    fn test_counter_visible_from_other_threads() {
        let journal = Arc::new(Journal::default());
        let executor = observed_executor(ScriptedProvider::new(journal), None);
        let stop = Arc::new(AtomicBool::new(false));

        let observer = {
            let executor = Arc::clone(&executor);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut max_seen = 0;
                while !stop.load(Ordering::Acquire) {
                    max_seen = max_seen.max(executor.uncompleted_operation_handler_count());
                }
                max_seen
            })
        };
        for id in 0..1_000 {
            executor.execute(op(id)).unwrap();
        }
        stop.store(true, Ordering::Release);

        assert!(observer.join().unwrap() <= 1);
        assert_eq!(executor.uncompleted_operation_handler_count(), 0);
    }
}
