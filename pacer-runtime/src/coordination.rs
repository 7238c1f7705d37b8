//! Completion-time coordination.
//!
//! Streams report the timestamp of every dependency operation they dequeue
//! as an "initiated time". A completion-time service aggregates these across
//! streams; this module defines the writer side of that contract plus an
//! in-process implementation.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use pacer_core::Instant;

use crate::error::CoordinationError;

/// Accepts initiated-time submissions from one stream.
///
/// Implementations must tolerate concurrent submission from many threads.
pub trait CompletionTimeWriter: Send + Sync {
    /// Records that an operation with timestamp `time` has been initiated.
    ///
    /// # Errors
    ///
    /// Returns an error if the submission cannot be accepted.
    fn submit_initiated_time(&self, time: Instant) -> Result<(), CoordinationError>;
}

/// In-process writer that tracks the latest initiated time.
///
/// Submissions must be non-decreasing; a time earlier than the last accepted
/// one is rejected.
#[derive(Debug)]
pub struct LocalCompletionTimeWriter {
    last_initiated: AtomicI64,
    submissions: AtomicU64,
}

const NONE_SUBMITTED: i64 = i64::MIN;

impl LocalCompletionTimeWriter {
    /// Creates a writer with no submissions.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_initiated: AtomicI64::new(NONE_SUBMITTED),
            submissions: AtomicU64::new(0),
        }
    }

    /// Returns the latest accepted initiated time, if any.
    #[must_use]
    pub fn last_initiated_time(&self) -> Option<Instant> {
        match self.last_initiated.load(Ordering::Acquire) {
            NONE_SUBMITTED => None,
            nanos => Some(Instant::from_nano(nanos)),
        }
    }

    /// Returns the number of accepted submissions.
    #[must_use]
    pub fn submission_count(&self) -> u64 {
        self.submissions.load(Ordering::Acquire)
    }

    /// Returns true once the terminal sentinel has been submitted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.last_initiated_time() == Some(Instant::MAX)
    }
}

impl Default for LocalCompletionTimeWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionTimeWriter for LocalCompletionTimeWriter {
    fn submit_initiated_time(&self, time: Instant) -> Result<(), CoordinationError> {
        let submitted = time.as_nano();
        self.last_initiated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                (submitted >= last).then_some(submitted)
            })
            .map_err(|last| CoordinationError::NonMonotonic {
                last: Instant::from_nano(last),
                submitted: time,
            })?;
        self.submissions.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
