//! Points in time and spans of time with nanosecond precision.
//!
//! Both types wrap a signed count of nanoseconds. Equality and ordering are
//! defined solely on that count, and every unit conversion is exact integer
//! scaling. There is no wrap-around handling: an `i64` of nanoseconds covers
//! roughly 292 years, far longer than any benchmark run.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;

/// A span of time with nanosecond precision.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(i64);

impl Duration {
    /// The zero-length duration.
    pub const ZERO: Self = Self(0);

    /// Creates a duration from nanoseconds.
    #[inline]
    #[must_use]
    pub const fn from_nano(ns: i64) -> Self {
        Self(ns)
    }

    /// Creates a duration from microseconds.
    #[inline]
    #[must_use]
    pub const fn from_micro(us: i64) -> Self {
        Self(us * NANOS_PER_MICRO)
    }

    /// Creates a duration from milliseconds.
    #[inline]
    #[must_use]
    pub const fn from_milli(ms: i64) -> Self {
        Self(ms * NANOS_PER_MILLI)
    }

    /// Creates a duration from seconds.
    #[inline]
    #[must_use]
    pub const fn from_seconds(s: i64) -> Self {
        Self(s * NANOS_PER_SECOND)
    }

    /// Creates a duration from minutes.
    #[inline]
    #[must_use]
    pub const fn from_minutes(m: i64) -> Self {
        Self(m * NANOS_PER_MINUTE)
    }

    /// Returns the duration in nanoseconds.
    #[inline]
    #[must_use]
    pub const fn as_nano(self) -> i64 {
        self.0
    }

    /// Returns the duration in whole microseconds.
    #[inline]
    #[must_use]
    pub const fn as_micro(self) -> i64 {
        self.0 / NANOS_PER_MICRO
    }

    /// Returns the duration in whole milliseconds.
    #[inline]
    #[must_use]
    pub const fn as_milli(self) -> i64 {
        self.0 / NANOS_PER_MILLI
    }

    /// Returns the duration in whole seconds.
    #[inline]
    #[must_use]
    pub const fn as_seconds(self) -> i64 {
        self.0 / NANOS_PER_SECOND
    }

    /// Returns `self + other`.
    #[inline]
    #[must_use]
    pub const fn plus(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }

    /// Returns `self - other`.
    #[inline]
    #[must_use]
    pub const fn minus(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }

    /// Returns how much longer `self` is than `other`.
    #[inline]
    #[must_use]
    pub const fn greater_by(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }

    /// Returns how much shorter `self` is than `other`.
    #[inline]
    #[must_use]
    pub const fn less_by(self, other: Self) -> Self {
        Self(other.0 - self.0)
    }

    /// Returns true if `self` is strictly longer than `other`.
    #[inline]
    #[must_use]
    pub const fn gt(self, other: Self) -> bool {
        self.0 > other.0
    }

    /// Returns true if `self` is strictly shorter than `other`.
    #[inline]
    #[must_use]
    pub const fn lt(self, other: Self) -> bool {
        self.0 < other.0
    }

    /// Returns true if `self` is at least as long as `other`.
    #[inline]
    #[must_use]
    pub const fn gte(self, other: Self) -> bool {
        self.0 >= other.0
    }

    /// Returns true if `self` is at most as long as `other`.
    #[inline]
    #[must_use]
    pub const fn lte(self, other: Self) -> bool {
        self.0 <= other.0
    }

    /// Returns the longer of two durations.
    #[inline]
    #[must_use]
    pub const fn max(a: Self, b: Self) -> Self {
        if a.0 > b.0 {
            a
        } else {
            b
        }
    }

    /// Converts to a `std::time::Duration`, clamping negative spans to zero.
    #[must_use]
    pub fn to_std(self) -> std::time::Duration {
        u64::try_from(self.0).map_or(std::time::Duration::ZERO, std::time::Duration::from_nanos)
    }
}

impl From<std::time::Duration> for Duration {
    fn from(duration: std::time::Duration) -> Self {
        Self(i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Duration({}ns)", self.0)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_ms = self.as_milli();
        let minutes = total_ms / 60_000;
        let seconds = (total_ms % 60_000) / 1_000;
        let millis = total_ms % 1_000;
        write!(f, "{minutes:02}:{seconds:02}.{millis:03} (m:s.ms)")
    }
}

/// A point in time, as nanoseconds since the Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Instant(i64);

impl Instant {
    /// The largest representable point in time.
    ///
    /// Used as the terminal initiated time once a stream has no more
    /// dependency operations.
    pub const MAX: Self = Self(i64::MAX);

    /// Creates an instant from nanoseconds since the epoch.
    #[inline]
    #[must_use]
    pub const fn from_nano(ns: i64) -> Self {
        Self(ns)
    }

    /// Creates an instant from microseconds since the epoch.
    #[inline]
    #[must_use]
    pub const fn from_micro(us: i64) -> Self {
        Self(us * NANOS_PER_MICRO)
    }

    /// Creates an instant from milliseconds since the epoch.
    #[inline]
    #[must_use]
    pub const fn from_milli(ms: i64) -> Self {
        Self(ms * NANOS_PER_MILLI)
    }

    /// Creates an instant from seconds since the epoch.
    #[inline]
    #[must_use]
    pub const fn from_seconds(s: i64) -> Self {
        Self(s * NANOS_PER_SECOND)
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(i64::try_from(since_epoch.as_nanos()).unwrap_or(i64::MAX))
    }

    /// Returns nanoseconds since the epoch.
    #[inline]
    #[must_use]
    pub const fn as_nano(self) -> i64 {
        self.0
    }

    /// Returns whole microseconds since the epoch.
    #[inline]
    #[must_use]
    pub const fn as_micro(self) -> i64 {
        self.0 / NANOS_PER_MICRO
    }

    /// Returns whole milliseconds since the epoch.
    #[inline]
    #[must_use]
    pub const fn as_milli(self) -> i64 {
        self.0 / NANOS_PER_MILLI
    }

    /// Returns whole seconds since the epoch.
    #[inline]
    #[must_use]
    pub const fn as_seconds(self) -> i64 {
        self.0 / NANOS_PER_SECOND
    }

    /// Returns how far `self` lies after `other`.
    #[inline]
    #[must_use]
    pub const fn greater_by(self, other: Self) -> Duration {
        Duration(self.0 - other.0)
    }

    /// Returns how far `self` lies before `other`.
    #[inline]
    #[must_use]
    pub const fn less_by(self, other: Self) -> Duration {
        Duration(other.0 - self.0)
    }

    /// Returns the instant `duration` after `self`.
    #[inline]
    #[must_use]
    pub const fn plus(self, duration: Duration) -> Self {
        Self(self.0 + duration.0)
    }

    /// Returns the instant `duration` before `self`.
    #[inline]
    #[must_use]
    pub const fn minus(self, duration: Duration) -> Self {
        Self(self.0 - duration.0)
    }

    /// Returns true if `self` is strictly after `other`.
    #[inline]
    #[must_use]
    pub const fn gt(self, other: Self) -> bool {
        self.0 > other.0
    }

    /// Returns true if `self` is strictly before `other`.
    #[inline]
    #[must_use]
    pub const fn lt(self, other: Self) -> bool {
        self.0 < other.0
    }

    /// Returns true if `self` is not before `other`.
    #[inline]
    #[must_use]
    pub const fn gte(self, other: Self) -> bool {
        self.0 >= other.0
    }

    /// Returns true if `self` is not after `other`.
    #[inline]
    #[must_use]
    pub const fn lte(self, other: Self) -> bool {
        self.0 <= other.0
    }
}

impl fmt::Debug for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instant({}ns)", self.0)
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.as_milli())
    }
}
