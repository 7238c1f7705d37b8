//! Workload runner.
//!
//! Wires the pieces of a run together: one metrics consumer thread, and per
//! stream a completion-time writer, a same-thread executor and a scheduling
//! thread. The runner supervises the streams and forces termination as soon
//! as any component reports an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration as StdDuration, Instant as StdInstant};

use pacer_core::{Instant, StreamId};
use pacer_workload::{Operation, OperationResult, Workload, WorkloadStreamDefinition};
use tracing::{info, warn};

use crate::config::DriverConfig;
use crate::coordination::LocalCompletionTimeWriter;
use crate::error::{DriverError, DriverResult};
use crate::executor::{OperationExecutor, SameThreadOperationExecutor};
use crate::handler::{ChildOperationGenerator, FnHandlerProvider, OperationHandlerProvider};
use crate::metrics::{
    MetricsManager, MetricsServiceHandle, ThreadedQueuedMetricsService, WorkloadResultsSnapshot,
};
use crate::reporter::{ConcurrentErrorReporter, ErrorReport};
use crate::retriever::InitiatedTimeSubmittingOperationRetriever;
use crate::stream::StreamSchedulingThread;

const SUPERVISOR_POLL_INTERVAL: StdDuration = StdDuration::from_millis(10);
const ERROR_SOURCE: &str = "runner";

/// Per-stream coordination summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    /// The stream.
    pub stream: StreamId,
    /// Last initiated time the stream submitted, if any.
    pub last_initiated_time: Option<Instant>,
    /// Number of initiated times submitted, sentinel included.
    pub initiated_submissions: u64,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Final metrics.
    pub results: WorkloadResultsSnapshot,
    /// Results the metrics thread processed.
    pub processed: u64,
    /// Every error reported during the run.
    pub errors: Vec<ErrorReport>,
    /// Whether the run was terminated early.
    pub forced: bool,
    /// Coordination summary for each stream, in stream order.
    pub streams: Vec<StreamOutcome>,
}

impl RunOutcome {
    /// Returns true if the run completed without errors.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && !self.forced
    }
}

struct RunningStream {
    id: StreamId,
    thread: JoinHandle<()>,
    finished: Arc<AtomicBool>,
    executor: Arc<SameThreadOperationExecutor>,
    writer: Arc<LocalCompletionTimeWriter>,
}

/// Runs workload streams to completion.
pub struct WorkloadRunner {
    config: DriverConfig,
    forced_terminate: Arc<AtomicBool>,
    child_generator: Option<Arc<dyn ChildOperationGenerator>>,
}

impl WorkloadRunner {
    /// Creates a runner.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: DriverConfig) -> DriverResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            forced_terminate: Arc::new(AtomicBool::new(false)),
            child_generator: None,
        })
    }

    /// Runs follow-up operations derived by `generator` in every stream.
    #[must_use]
    pub fn with_child_generator(mut self, generator: Arc<dyn ChildOperationGenerator>) -> Self {
        self.child_generator = Some(generator);
        self
    }

    /// Returns the runner's configuration.
    #[must_use]
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Returns the flag that stops every stream when set.
    ///
    /// The flag is never cleared, so once set every later run of this runner
    /// stops immediately.
    #[must_use]
    pub fn forced_terminate_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.forced_terminate)
    }

    /// Generates the configured synthetic workload and runs it against
    /// `system`.
    ///
    /// # Errors
    ///
    /// Returns an error if the workload cannot be generated or a run
    /// component fails to start or stop.
    pub fn run_workload<F>(&self, system: F) -> DriverResult<RunOutcome>
    where
        F: Fn(&Operation) -> Result<OperationResult, String> + Send + Sync + 'static,
    {
        let workload = Workload::new(self.config.workload_config(Instant::now()))?;
        info!(
            streams = self.config.stream_count,
            operations = workload.operation_count(),
            "generated workload"
        );
        let streams = workload.stream_definitions()?;
        self.run(streams, |metrics| -> Arc<dyn OperationHandlerProvider> {
            Arc::new(FnHandlerProvider::new(system, metrics))
        })
    }

    /// Runs `streams`, one scheduling thread each. `make_provider` receives
    /// the metrics handle handlers report results to.
    ///
    /// # Errors
    ///
    /// Returns an error if a thread cannot be spawned or the metrics pipeline
    /// fails. Errors inside streams are collected in the outcome instead.
    pub fn run<P>(
        &self,
        streams: Vec<WorkloadStreamDefinition>,
        make_provider: P,
    ) -> DriverResult<RunOutcome>
    where
        P: FnOnce(MetricsServiceHandle) -> Arc<dyn OperationHandlerProvider>,
    {
        let reporter = Arc::new(ConcurrentErrorReporter::new());
        let metrics =
            ThreadedQueuedMetricsService::start(MetricsManager::new(), Arc::clone(&reporter))?;
        let handle = metrics.handle();
        let provider = make_provider(metrics.handle());

        info!(streams = streams.len(), "starting run");
        let mut running = Vec::with_capacity(streams.len());
        for (index, definition) in (0_u64..).zip(streams) {
            match self.spawn_stream(StreamId::new(index), definition, &provider, &reporter) {
                Ok(stream) => running.push(stream),
                Err(e) => {
                    self.forced_terminate.store(true, Ordering::Release);
                    for stream in running {
                        let _ = stream.thread.join();
                    }
                    drop(provider);
                    if let Err(metrics_err) = metrics.shutdown() {
                        warn!(error = %metrics_err, "metrics shutdown failed after spawn error");
                    }
                    return Err(e);
                }
            }
        }

        self.supervise(&running, &reporter, &handle);

        for stream in &running {
            if let Err(e) = stream.executor.shutdown(self.config.executor_shutdown_timeout) {
                reporter.report_error(stream.id.to_string(), e.to_string());
            }
        }
        let mut outcomes = Vec::with_capacity(running.len());
        for stream in running {
            if stream.thread.join().is_err() {
                reporter.report_error(stream.id.to_string(), "scheduling thread panicked");
            }
            outcomes.push(StreamOutcome {
                stream: stream.id,
                last_initiated_time: stream.writer.last_initiated_time(),
                initiated_submissions: stream.writer.submission_count(),
            });
        }
        drop(provider);

        // Every stream has joined, so the snapshot covers every result.
        let results = handle.snapshot();
        let processed = metrics.shutdown()?;
        let results = results?;

        let forced = self.forced_terminate.load(Ordering::Acquire);
        info!(processed, forced, errors = reporter.error_count(), "run finished");
        Ok(RunOutcome {
            results,
            processed,
            errors: reporter.errors(),
            forced,
            streams: outcomes,
        })
    }

    fn spawn_stream(
        &self,
        id: StreamId,
        definition: WorkloadStreamDefinition,
        provider: &Arc<dyn OperationHandlerProvider>,
        reporter: &Arc<ConcurrentErrorReporter>,
    ) -> DriverResult<RunningStream> {
        let writer = Arc::new(LocalCompletionTimeWriter::new());
        let mut executor = SameThreadOperationExecutor::new(Arc::clone(provider));
        if let Some(generator) = &self.child_generator {
            executor = executor.with_child_generator(Arc::clone(generator));
        }
        let executor = Arc::new(executor);
        let finished = Arc::new(AtomicBool::new(false));

        let retriever = InitiatedTimeSubmittingOperationRetriever::new(definition, writer.clone());
        let thread = StreamSchedulingThread::new(
            id,
            retriever,
            executor.clone(),
            Arc::clone(reporter),
            self.forced_terminate_flag(),
            Arc::clone(&finished),
        )
        .with_drain_poll_interval(self.config.drain_poll_interval)
        .spawn()
        .map_err(|source| DriverError::Spawn { stream: id, source })?;

        Ok(RunningStream {
            id,
            thread,
            finished,
            executor,
            writer,
        })
    }

    fn supervise(
        &self,
        running: &[RunningStream],
        reporter: &ConcurrentErrorReporter,
        metrics: &MetricsServiceHandle,
    ) {
        let mut last_status = StdInstant::now();
        loop {
            // Streams report before they finish, so read the flags first.
            let all_finished = running.iter().all(|s| s.finished.load(Ordering::Acquire));
            if reporter.has_errors() && !self.forced_terminate.swap(true, Ordering::AcqRel) {
                warn!(
                    errors = reporter.error_count(),
                    "errors reported, forcing termination"
                );
            }
            if all_finished {
                return;
            }
            if let Some(interval) = self.config.status_interval {
                if last_status.elapsed() >= interval {
                    last_status = StdInstant::now();
                    match metrics.status() {
                        Ok(status) => info!(%status, "workload status"),
                        Err(e) => reporter
                            .report_error(ERROR_SOURCE, format!("status request failed: {e}")),
                    }
                }
            }
            thread::sleep(SUPERVISOR_POLL_INTERVAL);
        }
    }
}

impl std::fmt::Debug for WorkloadRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkloadRunner")
            .field("config", &self.config)
            .field("forced_terminate", &self.forced_terminate)
            .finish_non_exhaustive()
    }
}
