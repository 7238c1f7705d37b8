//! Time remapping for operation sequences.
//!
//! [`TimeMappingGenerator`] rewrites the scheduled start times of an ordered
//! operation sequence so that the first operation starts at a chosen instant,
//! optionally stretching or compressing the gaps between operations.
//!
//! # Algorithm
//!
//! The first operation is pinned to exactly the new start time. Every later
//! operation is first shifted by the offset between the original and new start
//! times, then passed through the compression function. Compression measures
//! the gap (in whole milliseconds) from the previously seen operation, scales
//! it by the ratio with round-half-away-from-zero, and adds it to the
//! previously returned time. Anchoring on the previous pair bounds rounding
//! error to one step instead of letting it compound from the start.

use pacer_core::{Duration, Error, Instant, Result};

use crate::operation::Operation;

/// Shift applied to every operation after the first.
#[derive(Debug, Clone, Copy)]
enum TimeOffset {
    /// The new start lies after the original start.
    Future(Duration),
    /// The new start lies at or before the original start.
    Past(Duration),
}

impl TimeOffset {
    const fn between(original_start: Instant, new_start: Instant) -> Self {
        if new_start.gt(original_start) {
            Self::Future(new_start.greater_by(original_start))
        } else {
            Self::Past(new_start.less_by(original_start))
        }
    }

    const fn apply(self, time: Instant) -> Instant {
        match self {
            Self::Future(offset) => time.plus(offset),
            Self::Past(offset) => time.minus(offset),
        }
    }
}

/// Pacing applied after the offset.
#[derive(Debug, Clone, Copy)]
enum TimeCompression {
    Identity,
    Ratio {
        ratio: f64,
        last_seen: Instant,
        last_returned: Instant,
    },
}

impl TimeCompression {
    #[allow(clippy::cast_precision_loss)]
    #[allow(clippy::cast_possible_truncation)] // Scaled gaps stay well inside i64 milliseconds.
    fn apply(&mut self, time: Instant) -> Instant {
        match self {
            Self::Identity => time,
            Self::Ratio {
                ratio,
                last_seen,
                last_returned,
            } => {
                let gap_ms = time.greater_by(*last_seen).as_milli();
                let scaled_ms = (gap_ms as f64 * *ratio).round() as i64;
                let mapped = last_returned.plus(Duration::from_milli(scaled_ms));
                *last_seen = time;
                *last_returned = mapped;
                mapped
            }
        }
    }
}

#[derive(Debug)]
struct MappingState {
    offset: TimeOffset,
    compression: TimeCompression,
}

/// Lazily remaps the scheduled start times of an ordered operation sequence.
///
/// Pulls exactly one operation from the source per operation produced. The
/// generator is stateful: use one instance per traversal.
#[derive(Debug)]
pub struct TimeMappingGenerator<I> {
    source: I,
    new_start_time: Instant,
    compression_ratio: Option<f64>,
    state: Option<MappingState>,
}

impl<I> TimeMappingGenerator<I>
where
    I: Iterator<Item = Operation>,
{
    /// Creates a generator that only offsets start times to `new_start_time`.
    #[must_use]
    pub const fn new(source: I, new_start_time: Instant) -> Self {
        Self {
            source,
            new_start_time,
            compression_ratio: None,
            state: None,
        }
    }

    /// Creates a generator that offsets start times and scales the gaps
    /// between them by `compression_ratio`.
    ///
    /// # Errors
    ///
    /// Returns an error if the ratio is negative or not finite.
    pub fn with_compression(
        source: I,
        new_start_time: Instant,
        compression_ratio: f64,
    ) -> Result<Self> {
        if !compression_ratio.is_finite() {
            return Err(Error::InvalidArgument {
                name: "time_compression_ratio",
                reason: "must be finite",
            });
        }
        if compression_ratio < 0.0 {
            return Err(Error::InvalidArgument {
                name: "time_compression_ratio",
                reason: "must be >= 0",
            });
        }
        Ok(Self {
            source,
            new_start_time,
            compression_ratio: Some(compression_ratio),
            state: None,
        })
    }
}

impl<I> Iterator for TimeMappingGenerator<I>
where
    I: Iterator<Item = Operation>,
{
    type Item = Operation;

    fn next(&mut self) -> Option<Operation> {
        let mut operation = self.source.next()?;

        match &mut self.state {
            Some(state) => {
                let offset_time = state.offset.apply(operation.scheduled_start_time());
                let mapped = state.compression.apply(offset_time);
                operation.set_scheduled_start_time(mapped);
            }
            None => {
                let original_start = operation.scheduled_start_time();
                let compression = match self.compression_ratio {
                    None => TimeCompression::Identity,
                    Some(ratio) => TimeCompression::Ratio {
                        ratio,
                        last_seen: self.new_start_time,
                        last_returned: self.new_start_time,
                    },
                };
                self.state = Some(MappingState {
                    offset: TimeOffset::between(original_start, self.new_start_time),
                    compression,
                });
                // The anchor bypasses both functions.
                operation.set_scheduled_start_time(self.new_start_time);
            }
        }

        Some(operation)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.source.size_hint()
    }
}
