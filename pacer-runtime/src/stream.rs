//! Per-stream scheduling thread.
//!
//! A scheduling thread pulls operations from its retriever and submits them
//! to its executor until the stream runs dry, an error occurs, or forced
//! termination is requested. Whatever happens, it then waits for the
//! executor's in-flight operations to drain before marking itself finished.
//! Under forced termination the drain is skipped.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use pacer_core::StreamId;
use tracing::{debug, info, warn};

use crate::error::ExecutorError;
use crate::executor::OperationExecutor;
use crate::reporter::ConcurrentErrorReporter;
use crate::retriever::InitiatedTimeSubmittingOperationRetriever;

/// Default interval between in-flight polls while draining.
pub const DEFAULT_DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Replays one workload stream.
pub struct StreamSchedulingThread {
    stream_id: StreamId,
    retriever: InitiatedTimeSubmittingOperationRetriever,
    executor: Arc<dyn OperationExecutor>,
    reporter: Arc<ConcurrentErrorReporter>,
    forced_terminate: Arc<AtomicBool>,
    has_finished: Arc<AtomicBool>,
    drain_poll_interval: Duration,
}

impl StreamSchedulingThread {
    /// Creates a scheduling thread for one stream.
    ///
    /// `has_finished` is set once the stream has stopped submitting and its
    /// in-flight operations have drained.
    #[must_use]
    pub fn new(
        stream_id: StreamId,
        retriever: InitiatedTimeSubmittingOperationRetriever,
        executor: Arc<dyn OperationExecutor>,
        reporter: Arc<ConcurrentErrorReporter>,
        forced_terminate: Arc<AtomicBool>,
        has_finished: Arc<AtomicBool>,
    ) -> Self {
        Self {
            stream_id,
            retriever,
            executor,
            reporter,
            forced_terminate,
            has_finished,
            drain_poll_interval: DEFAULT_DRAIN_POLL_INTERVAL,
        }
    }

    /// Sets the interval between in-flight polls while draining.
    #[must_use]
    pub const fn with_drain_poll_interval(mut self, interval: Duration) -> Self {
        self.drain_poll_interval = interval;
        self
    }

    /// Runs the stream on a new named thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("pacer-{}", self.stream_id))
            .spawn(move || self.run())
    }

    /// Runs the stream on the current thread until it has finished.
    pub fn run(mut self) {
        let stream = self.stream_id;
        info!(stream = %stream, "stream scheduling started");

        match panic::catch_unwind(AssertUnwindSafe(|| self.submit_all())) {
            Ok(Ok(submitted)) => {
                debug!(stream = %stream, submitted, "stream submitted all operations");
            }
            Ok(Err(e)) => {
                self.reporter.report_error(
                    stream.to_string(),
                    format!("error while submitting operations: {e}"),
                );
            }
            Err(payload) => {
                self.reporter.report_error(
                    stream.to_string(),
                    format!("panic while submitting operations: {}", panic_message(payload)),
                );
            }
        }

        self.drain();
        self.has_finished.store(true, Ordering::Release);
        info!(stream = %stream, "stream scheduling finished");
    }

    fn submit_all(&mut self) -> Result<u64, ExecutorError> {
        let mut submitted = 0;
        while self.retriever.has_next_operation() && !self.is_forced() {
            let operation = self.retriever.next_operation()?;
            self.executor.execute(operation)?;
            submitted += 1;
        }
        if self.is_forced() {
            warn!(stream = %self.stream_id, submitted, "stream stopped by forced termination");
        }
        Ok(submitted)
    }

    fn drain(&self) {
        loop {
            if self.is_forced() {
                debug!(stream = %self.stream_id, "skipping drain under forced termination");
                return;
            }
            let in_flight = self.executor.uncompleted_operation_handler_count();
            if in_flight == 0 {
                return;
            }
            debug!(stream = %self.stream_id, in_flight, "waiting for in-flight operations");
            thread::sleep(self.drain_poll_interval);
        }
    }

    fn is_forced(&self) -> bool {
        self.forced_terminate.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for StreamSchedulingThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSchedulingThread")
            .field("stream_id", &self.stream_id)
            .field("drain_poll_interval", &self.drain_poll_interval)
            .finish_non_exhaustive()
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic payload".to_string()
    }
}
