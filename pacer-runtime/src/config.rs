//! Driver configuration.

use std::time::Duration as StdDuration;

use pacer_core::{Duration, Instant};
use pacer_workload::{TimeMapping, WorkloadConfig};

use crate::error::ConfigError;
use crate::stream::DEFAULT_DRAIN_POLL_INTERVAL;

/// Environment variable overriding the default drain poll interval.
pub const DRAIN_POLL_INTERVAL_ENV: &str = "PACER_DRAIN_POLL_INTERVAL_MS";

/// Configuration for one benchmark run.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    /// Number of workload streams, each replayed on its own thread.
    pub stream_count: u32,
    /// Operations generated per stream.
    pub operations_per_stream: u64,
    /// Probability that a generated operation is a dependency operation.
    pub dependency_ratio: f64,
    /// Logical time between consecutive generated operations.
    pub operation_spacing: Duration,
    /// Seed for workload generation.
    pub seed: u64,
    /// Gap scaling applied when remapping start times. `None` keeps the
    /// generated spacing.
    pub time_compression_ratio: Option<f64>,
    /// How far after the run starts the first operation is scheduled.
    pub start_delay: Duration,
    /// Interval between in-flight polls while a stream drains.
    pub drain_poll_interval: StdDuration,
    /// How long each executor may take to shut down.
    pub executor_shutdown_timeout: Duration,
    /// Interval between status log lines. `None` disables them.
    pub status_interval: Option<StdDuration>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        let drain_poll_interval = std::env::var(DRAIN_POLL_INTERVAL_ENV)
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(DEFAULT_DRAIN_POLL_INTERVAL, StdDuration::from_millis);

        Self {
            stream_count: 1,
            operations_per_stream: 1000,
            dependency_ratio: 0.2,
            operation_spacing: Duration::from_milli(1),
            seed: 0,
            time_compression_ratio: None,
            start_delay: Duration::from_milli(100),
            drain_poll_interval,
            executor_shutdown_timeout: Duration::from_seconds(5),
            status_interval: None,
        }
    }
}

impl DriverConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of streams.
    #[must_use]
    pub const fn with_stream_count(mut self, stream_count: u32) -> Self {
        self.stream_count = stream_count;
        self
    }

    /// Sets the number of operations per stream.
    #[must_use]
    pub const fn with_operations_per_stream(mut self, operations: u64) -> Self {
        self.operations_per_stream = operations;
        self
    }

    /// Sets the dependency operation ratio.
    #[must_use]
    pub const fn with_dependency_ratio(mut self, ratio: f64) -> Self {
        self.dependency_ratio = ratio;
        self
    }

    /// Sets the logical spacing between operations.
    #[must_use]
    pub const fn with_operation_spacing(mut self, spacing: Duration) -> Self {
        self.operation_spacing = spacing;
        self
    }

    /// Sets the workload seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the time compression ratio.
    #[must_use]
    pub const fn with_time_compression_ratio(mut self, ratio: Option<f64>) -> Self {
        self.time_compression_ratio = ratio;
        self
    }

    /// Sets the delay before the first operation.
    #[must_use]
    pub const fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Sets the drain poll interval.
    #[must_use]
    pub const fn with_drain_poll_interval(mut self, interval: StdDuration) -> Self {
        self.drain_poll_interval = interval;
        self
    }

    /// Sets the executor shutdown timeout.
    #[must_use]
    pub const fn with_executor_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.executor_shutdown_timeout = timeout;
        self
    }

    /// Sets the status log interval.
    #[must_use]
    pub const fn with_status_interval(mut self, interval: Option<StdDuration>) -> Self {
        self.status_interval = interval;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream_count == 0 {
            return Err(invalid("stream_count", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.dependency_ratio) {
            return Err(invalid("dependency_ratio", "must be in [0, 1]"));
        }
        if self.operation_spacing.lt(Duration::ZERO) {
            return Err(invalid("operation_spacing", "must not be negative"));
        }
        if let Some(ratio) = self.time_compression_ratio {
            if !ratio.is_finite() || ratio < 0.0 {
                return Err(invalid(
                    "time_compression_ratio",
                    "must be finite and >= 0",
                ));
            }
        }
        if self.start_delay.lt(Duration::ZERO) {
            return Err(invalid("start_delay", "must not be negative"));
        }
        if self.drain_poll_interval.is_zero() {
            return Err(invalid("drain_poll_interval", "must be positive"));
        }
        if self.executor_shutdown_timeout.lt(Duration::ZERO) {
            return Err(invalid("executor_shutdown_timeout", "must not be negative"));
        }
        if self.status_interval.is_some_and(|i| i.is_zero()) {
            return Err(invalid("status_interval", "must be positive"));
        }
        Ok(())
    }

    /// Builds the workload configuration, with the first operation scheduled
    /// `start_delay` after `now`.
    #[must_use]
    pub fn workload_config(&self, now: Instant) -> WorkloadConfig {
        WorkloadConfig {
            seed: self.seed,
            streams: self.stream_count,
            operations_per_stream: self.operations_per_stream,
            dependency_ratio: self.dependency_ratio,
            spacing: self.operation_spacing,
            time_mapping: Some(TimeMapping {
                start_time: now.plus(self.start_delay),
                compression_ratio: self.time_compression_ratio,
            }),
            ..WorkloadConfig::default()
        }
    }
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError {
        name,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(DriverConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_fields_are_named() {
        let err = DriverConfig::new().with_stream_count(0).validate().unwrap_err();
        assert_eq!(err.name, "stream_count");

        let err = DriverConfig::new()
            .with_time_compression_ratio(Some(-0.5))
            .validate()
            .unwrap_err();
        assert_eq!(err.name, "time_compression_ratio");

        let err = DriverConfig::new()
            .with_time_compression_ratio(Some(f64::INFINITY))
            .validate()
            .unwrap_err();
        assert_eq!(err.name, "time_compression_ratio");

        let err = DriverConfig::new()
            .with_drain_poll_interval(StdDuration::ZERO)
            .validate()
            .unwrap_err();
        assert_eq!(err.name, "drain_poll_interval");

        let err = DriverConfig::new()
            .with_dependency_ratio(2.0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("dependency_ratio"));
    }

    #[test]
    fn test_zero_compression_ratio_is_valid() {
        let config = DriverConfig::new().with_time_compression_ratio(Some(0.0));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_workload_config_schedules_after_start_delay() {
        let config = DriverConfig::new()
            .with_stream_count(3)
            .with_seed(11)
            .with_start_delay(Duration::from_milli(250))
            .with_time_compression_ratio(Some(0.5));
        let workload = config.workload_config(Instant::from_milli(1_000));

        assert_eq!(workload.streams, 3);
        assert_eq!(workload.seed, 11);
        let mapping = workload.time_mapping.unwrap();
        assert_eq!(mapping.start_time, Instant::from_milli(1_250));
        assert_eq!(mapping.compression_ratio, Some(0.5));
    }
}
