//! Queued metrics collection on a dedicated thread.
//!
//! Producers on any thread push [`MetricsCollectionEvent`]s onto an unbounded
//! queue. A single consumer thread owns the [`MetricsModel`] and is its only
//! writer. The consumer blocks on the queue rather than spinning.
//!
//! The consumer stops once a `Termination` event has fixed the expected
//! number of results and that many results have been processed. Requests sent
//! after it stops fail with [`MetricsError::ServiceTerminated`] instead of
//! waiting forever.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use pacer_workload::OperationResultReport;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::error::MetricsError;
use crate::metrics::event::MetricsCollectionEvent;
use crate::metrics::manager::{MetricsModel, WorkloadResultsSnapshot, WorkloadStatusSnapshot};
use crate::reporter::ConcurrentErrorReporter;
use crate::stream::panic_message;

const ERROR_SOURCE: &str = "metrics";

// =============================================================================
// Handle
// =============================================================================

/// Cloneable producer side of the metrics queue.
#[derive(Debug, Clone)]
pub struct MetricsServiceHandle {
    sender: mpsc::UnboundedSender<MetricsCollectionEvent>,
    submitted: Arc<AtomicU64>,
}

impl MetricsServiceHandle {
    /// Queues a completed operation for measurement.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::ServiceTerminated`] if the consumer has exited.
    pub fn submit_result(&self, report: OperationResultReport) -> Result<(), MetricsError> {
        self.send(MetricsCollectionEvent::SubmitResult(report))?;
        self.submitted.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Requests the current status and blocks until it is answered.
    ///
    /// Must not be called from inside an async runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::ServiceTerminated`] if the consumer exits
    /// before answering, or the model's error if it cannot compute a status.
    pub fn status(&self) -> Result<WorkloadStatusSnapshot, MetricsError> {
        let (tx, rx) = oneshot::channel();
        self.send(MetricsCollectionEvent::Status(tx))?;
        rx.blocking_recv()
            .map_err(|_| MetricsError::ServiceTerminated)?
    }

    /// Requests a full results snapshot and blocks until it is answered.
    ///
    /// Must not be called from inside an async runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::ServiceTerminated`] if the consumer exits
    /// before answering, or the model's error if it cannot compute a snapshot.
    pub fn snapshot(&self) -> Result<WorkloadResultsSnapshot, MetricsError> {
        let (tx, rx) = oneshot::channel();
        self.send(MetricsCollectionEvent::Snapshot(tx))?;
        rx.blocking_recv()
            .map_err(|_| MetricsError::ServiceTerminated)?
    }

    /// Tells the consumer how many results will be submitted in total.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::ServiceTerminated`] if the consumer has exited.
    pub fn terminate(&self, expected_event_count: u64) -> Result<(), MetricsError> {
        self.send(MetricsCollectionEvent::Termination {
            expected_event_count,
        })
    }

    /// Returns the number of results submitted through every clone of this
    /// handle.
    #[must_use]
    pub fn submitted_count(&self) -> u64 {
        self.submitted.load(Ordering::Acquire)
    }

    fn send(&self, event: MetricsCollectionEvent) -> Result<(), MetricsError> {
        self.sender
            .send(event)
            .map_err(|_| MetricsError::ServiceTerminated)
    }
}

// =============================================================================
// Consumer
// =============================================================================

struct MetricsCollector<M> {
    model: M,
    reporter: Arc<ConcurrentErrorReporter>,
    processed: u64,
    expected: Option<u64>,
}

/// Whether the consumer keeps going after an event.
enum Flow {
    Continue,
    Exit,
}

impl<M: MetricsModel> MetricsCollector<M> {
    fn run(mut self, mut receiver: mpsc::UnboundedReceiver<MetricsCollectionEvent>) -> u64 {
        info!("metrics collection started");
        loop {
            if self.expected.is_some_and(|expected| self.processed >= expected) {
                info!(processed = self.processed, "metrics collection finished");
                break;
            }
            let Some(event) = receiver.blocking_recv() else {
                warn!(
                    processed = self.processed,
                    "all metrics producers dropped before termination"
                );
                break;
            };
            let kind = event.kind();
            trace!(kind, "metrics event received");
            let flow = match panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(event))) {
                Ok(flow) => flow,
                Err(payload) => {
                    self.reporter.report_error(
                        ERROR_SOURCE,
                        format!(
                            "panic while handling {kind} event: {}",
                            panic_message(payload)
                        ),
                    );
                    Flow::Exit
                }
            };
            if matches!(flow, Flow::Exit) {
                break;
            }
        }
        // Closing first fails pending and later requests fast.
        receiver.close();
        self.processed
    }

    fn dispatch(&mut self, event: MetricsCollectionEvent) -> Flow {
        match event {
            MetricsCollectionEvent::SubmitResult(report) => {
                if let Err(e) = self.model.measure(&report) {
                    let message = match e {
                        // Already describes the result.
                        MetricsError::Measure { .. } => e.to_string(),
                        e => format!("error collecting metrics for result {report}: {e}"),
                    };
                    self.reporter.report_error(ERROR_SOURCE, message);
                }
                self.processed += 1;
                Flow::Continue
            }
            MetricsCollectionEvent::Status(promise) => {
                let status = self.model.status();
                self.answer(promise, status, "status")
            }
            MetricsCollectionEvent::Snapshot(promise) => {
                let snapshot = self.model.snapshot();
                self.answer(promise, snapshot, "snapshot")
            }
            MetricsCollectionEvent::Termination {
                expected_event_count,
            } => {
                match self.expected {
                    None => {
                        debug!(expected = expected_event_count, "termination received");
                        self.expected = Some(expected_event_count);
                    }
                    Some(first) => {
                        let e = MetricsError::DuplicateTermination {
                            first,
                            second: expected_event_count,
                        };
                        self.reporter.report_error(ERROR_SOURCE, e.to_string());
                    }
                }
                Flow::Continue
            }
        }
    }

    fn answer<T>(
        &self,
        promise: oneshot::Sender<Result<T, MetricsError>>,
        value: Result<T, MetricsError>,
        what: &'static str,
    ) -> Flow {
        let flow = match &value {
            Ok(_) => Flow::Continue,
            Err(e) => {
                self.reporter
                    .report_error(ERROR_SOURCE, format!("failed to compute {what}: {e}"));
                Flow::Exit
            }
        };
        if promise.send(value).is_err() {
            debug!(what, "requester went away before the reply");
        }
        flow
    }
}

// =============================================================================
// Service
// =============================================================================

/// Owns the metrics consumer thread.
#[derive(Debug)]
pub struct ThreadedQueuedMetricsService {
    handle: MetricsServiceHandle,
    thread: JoinHandle<u64>,
}

impl ThreadedQueuedMetricsService {
    /// Spawns the consumer thread, which takes ownership of `model`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Spawn`] if the thread cannot be spawned.
    pub fn start<M>(model: M, reporter: Arc<ConcurrentErrorReporter>) -> Result<Self, MetricsError>
    where
        M: MetricsModel + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let collector = MetricsCollector {
            model,
            reporter,
            processed: 0,
            expected: None,
        };
        let thread = thread::Builder::new()
            .name("pacer-metrics".to_string())
            .spawn(move || collector.run(receiver))
            .map_err(MetricsError::Spawn)?;

        Ok(Self {
            handle: MetricsServiceHandle {
                sender,
                submitted: Arc::new(AtomicU64::new(0)),
            },
            thread,
        })
    }

    /// Returns a new producer handle.
    #[must_use]
    pub fn handle(&self) -> MetricsServiceHandle {
        self.handle.clone()
    }

    /// Sends `Termination` with the number of results submitted so far and
    /// waits for the consumer to finish. Returns the number of results it
    /// processed.
    ///
    /// Every producer must have stopped submitting before this is called.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::ThreadPanicked`] if the consumer panicked.
    pub fn shutdown(self) -> Result<u64, MetricsError> {
        let expected = self.handle.submitted_count();
        if let Err(e) = self.handle.terminate(expected) {
            warn!(error = %e, "metrics consumer exited before shutdown");
        }
        drop(self.handle);
        let processed = self
            .thread
            .join()
            .map_err(|_| MetricsError::ThreadPanicked)?;
        debug!(expected, processed, "metrics service shut down");
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use pacer_core::{Duration, Instant, OperationId};
    use pacer_workload::{Operation, OperationResult};

    use super::*;
    use crate::metrics::manager::MetricsManager;

    fn report(id: u64, run_us: i64) -> OperationResultReport {
        OperationResultReport {
            operation: Operation::new(OperationId::new(id), "read", Instant::from_milli(0)),
            result: OperationResult::ok(None),
            actual_start_time: Instant::from_milli(0),
            run_duration: Duration::from_micro(run_us),
        }
    }

    struct BrokenModel;

    impl MetricsModel for BrokenModel {
        fn measure(&mut self, _report: &OperationResultReport) -> Result<(), MetricsError> {
            Ok(())
        }

        fn status(&self) -> Result<WorkloadStatusSnapshot, MetricsError> {
            Err(MetricsError::Model {
                message: "status unavailable".to_string(),
            })
        }

        fn snapshot(&self) -> Result<WorkloadResultsSnapshot, MetricsError> {
            MetricsManager::new().snapshot()
        }
    }

    /// Rejects every result without describing it.
    struct RejectingModel;

    impl MetricsModel for RejectingModel {
        fn measure(&mut self, _report: &OperationResultReport) -> Result<(), MetricsError> {
            Err(MetricsError::Model {
                message: "nope".to_string(),
            })
        }

        fn status(&self) -> Result<WorkloadStatusSnapshot, MetricsError> {
            MetricsManager::new().status()
        }

        fn snapshot(&self) -> Result<WorkloadResultsSnapshot, MetricsError> {
            MetricsManager::new().snapshot()
        }
    }

    struct PanickingModel;

    impl MetricsModel for PanickingModel {
        fn measure(&mut self, _report: &OperationResultReport) -> Result<(), MetricsError> {
            panic!("histogram corrupted");
        }

        fn status(&self) -> Result<WorkloadStatusSnapshot, MetricsError> {
            MetricsManager::new().status()
        }

        fn snapshot(&self) -> Result<WorkloadResultsSnapshot, MetricsError> {
            MetricsManager::new().snapshot()
        }
    }

    #[test]
    fn test_processes_expected_results_then_stops() {
        let reporter = Arc::new(ConcurrentErrorReporter::new());
        let service = ThreadedQueuedMetricsService::start(MetricsManager::new(), reporter.clone())
            .unwrap();
        let handle = service.handle();

        for i in 0..5 {
            handle.submit_result(report(i, 100)).unwrap();
        }
        let snapshot = handle.snapshot().unwrap();
        assert_eq!(snapshot.operation_count, 5);

        drop(handle);
        assert_eq!(service.shutdown().unwrap(), 5);
        assert!(!reporter.has_errors());
    }

    #[test]
    fn test_measure_failure_is_reported_and_counted() {
        let reporter = Arc::new(ConcurrentErrorReporter::new());
        let service = ThreadedQueuedMetricsService::start(MetricsManager::new(), reporter.clone())
            .unwrap();
        let handle = service.handle();

        handle.submit_result(report(1, 100)).unwrap();
        handle.submit_result(report(2, -1)).unwrap();
        handle.submit_result(report(3, 100)).unwrap();

        let status = handle.status().unwrap();
        assert_eq!(status.operation_count, 2);

        drop(handle);
        assert_eq!(service.shutdown().unwrap(), 3);
        assert_eq!(reporter.error_count(), 1);
        assert!(reporter.errors()[0].message.contains("op-2"));
    }

    #[test]
    fn test_measure_failure_report_names_the_result() {
        let reporter = Arc::new(ConcurrentErrorReporter::new());
        let service =
            ThreadedQueuedMetricsService::start(RejectingModel, reporter.clone()).unwrap();
        let handle = service.handle();

        handle.submit_result(report(42, 100)).unwrap();

        drop(handle);
        assert_eq!(service.shutdown().unwrap(), 1);
        assert_eq!(reporter.error_count(), 1);
        let errors = reporter.errors();
        let message = &errors[0].message;
        assert!(message.contains("op-42"), "message: {message}");
        assert!(message.contains("nope"), "message: {message}");
    }

    #[test]
    fn test_panic_in_model_is_reported_and_stops_consumer() {
        let reporter = Arc::new(ConcurrentErrorReporter::new());
        let service =
            ThreadedQueuedMetricsService::start(PanickingModel, reporter.clone()).unwrap();
        let handle = service.handle();

        handle.submit_result(report(1, 100)).unwrap();
        assert!(handle.status().is_err());

        drop(handle);
        assert_eq!(service.shutdown().unwrap(), 0);
        assert_eq!(reporter.error_count(), 1);
        let errors = reporter.errors();
        let error = &errors[0];
        assert_eq!(error.source, "metrics");
        assert!(error.message.contains("histogram corrupted"));
        assert!(error.message.contains("submit_result"));
    }

    #[test]
    fn test_duplicate_termination_keeps_first_count() {
        let reporter = Arc::new(ConcurrentErrorReporter::new());
        let service = ThreadedQueuedMetricsService::start(MetricsManager::new(), reporter.clone())
            .unwrap();
        let handle = service.handle();

        handle.terminate(2).unwrap();
        handle.terminate(4).unwrap();
        handle.submit_result(report(1, 10)).unwrap();
        handle.submit_result(report(2, 10)).unwrap();

        // The consumer stops after two results; shutdown's own termination
        // arrives too late to be processed.
        assert_eq!(service.shutdown().unwrap(), 2);
        assert_eq!(reporter.error_count(), 1);
        assert!(reporter.errors()[0].message.contains("multiple termination"));
    }

    #[test]
    fn test_late_request_fails_instead_of_hanging() {
        let reporter = Arc::new(ConcurrentErrorReporter::new());
        let service = ThreadedQueuedMetricsService::start(MetricsManager::new(), reporter)
            .unwrap();
        let handle = service.handle();

        handle.submit_result(report(1, 10)).unwrap();
        assert_eq!(service.shutdown().unwrap(), 1);

        assert!(matches!(handle.status(), Err(MetricsError::ServiceTerminated)));
        assert!(matches!(handle.snapshot(), Err(MetricsError::ServiceTerminated)));
        assert!(matches!(
            handle.submit_result(report(2, 10)),
            Err(MetricsError::ServiceTerminated)
        ));
    }

    #[test]
    fn test_model_failure_stops_consumer() {
        let reporter = Arc::new(ConcurrentErrorReporter::new());
        let service = ThreadedQueuedMetricsService::start(BrokenModel, reporter.clone()).unwrap();
        let handle = service.handle();

        assert!(matches!(handle.status(), Err(MetricsError::Model { .. })));
        assert!(matches!(handle.snapshot(), Err(MetricsError::ServiceTerminated)));

        drop(handle);
        assert_eq!(service.shutdown().unwrap(), 0);
        assert_eq!(reporter.error_count(), 1);
    }

    #[test]
    fn test_status_reflects_earlier_results() {
        let reporter = Arc::new(ConcurrentErrorReporter::new());
        let service = ThreadedQueuedMetricsService::start(MetricsManager::new(), reporter).unwrap();
        let handle = service.handle();

        let producers: Vec<_> = (0..4_u64)
            .map(|t| {
                let handle = handle.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        handle.submit_result(report(t * 100 + i, 5)).unwrap();
                    }
                    // Everything this thread enqueued precedes the request.
                    let status = handle.status().unwrap();
                    assert!(status.operation_count >= 50);
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        assert_eq!(handle.submitted_count(), 200);
        drop(handle);
        assert_eq!(service.shutdown().unwrap(), 200);
    }
}
