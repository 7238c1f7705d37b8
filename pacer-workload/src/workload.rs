//! Deterministic synthetic workload generation.
//!
//! Builds per-stream operation sequences from a seed. Each stream is an
//! evenly spaced series of operations, each one a dependency ("write") or
//! non-dependency ("read") operation by a seeded coin flip. The same
//! configuration always yields the same operations.

use bytes::Bytes;
use pacer_core::{Duration, Instant, OperationId};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use crate::generator::TimeMappingGenerator;
use crate::operation::Operation;
use crate::stream::WorkloadStreamDefinition;

/// Operation kind for dependency operations.
pub const KIND_WRITE: &str = "write";
/// Operation kind for non-dependency operations.
pub const KIND_READ: &str = "read";

/// Errors from workload generation.
#[derive(Debug, Error)]
pub enum WorkloadError {
    /// Invalid configuration.
    #[error("invalid workload configuration: {0}")]
    InvalidConfig(String),

    /// Time remapping could not be set up.
    #[error("time mapping: {0}")]
    TimeMapping(#[from] pacer_core::Error),
}

/// How generated operations are remapped onto the wall clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeMapping {
    /// Where the first operation of every stream is moved to.
    pub start_time: Instant,
    /// Optional gap scaling; `None` keeps the original spacing.
    pub compression_ratio: Option<f64>,
}

/// Workload configuration.
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// Random seed for deterministic generation.
    pub seed: u64,
    /// Number of independent streams.
    pub streams: u32,
    /// Operations generated per stream.
    pub operations_per_stream: u64,
    /// Probability (0.0 to 1.0) that an operation is a dependency operation.
    pub dependency_ratio: f64,
    /// Logical time between consecutive operations of a stream.
    pub spacing: Duration,
    /// Logical timestamp of the first operation.
    pub first_timestamp: Instant,
    /// Payload size in bytes.
    pub payload_size: usize,
    /// Optional remapping of scheduled start times.
    pub time_mapping: Option<TimeMapping>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            streams: 1,
            operations_per_stream: 1000,
            dependency_ratio: 0.2,
            spacing: Duration::from_milli(1),
            first_timestamp: Instant::from_milli(0),
            payload_size: 16,
            time_mapping: None,
        }
    }
}

/// Builder for creating workloads.
#[derive(Debug, Default)]
pub struct WorkloadBuilder {
    config: WorkloadConfig,
}

impl WorkloadBuilder {
    /// Creates a new workload builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the random seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Sets the number of streams.
    #[must_use]
    pub const fn streams(mut self, streams: u32) -> Self {
        self.config.streams = streams;
        self
    }

    /// Sets the number of operations per stream.
    #[must_use]
    pub const fn operations_per_stream(mut self, operations: u64) -> Self {
        self.config.operations_per_stream = operations;
        self
    }

    /// Sets the probability that an operation is a dependency operation.
    #[must_use]
    pub const fn dependency_ratio(mut self, ratio: f64) -> Self {
        self.config.dependency_ratio = ratio;
        self
    }

    /// Sets the logical spacing between operations.
    #[must_use]
    pub const fn spacing(mut self, spacing: Duration) -> Self {
        self.config.spacing = spacing;
        self
    }

    /// Sets the logical timestamp of the first operation.
    #[must_use]
    pub const fn first_timestamp(mut self, timestamp: Instant) -> Self {
        self.config.first_timestamp = timestamp;
        self
    }

    /// Sets the payload size.
    #[must_use]
    pub const fn payload_size(mut self, size: usize) -> Self {
        self.config.payload_size = size;
        self
    }

    /// Remaps scheduled start times to begin at `start_time`, optionally
    /// scaling gaps by `compression_ratio`.
    #[must_use]
    pub const fn time_mapping(mut self, start_time: Instant, compression_ratio: Option<f64>) -> Self {
        self.config.time_mapping = Some(TimeMapping {
            start_time,
            compression_ratio,
        });
        self
    }

    /// Builds the workload.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> Result<Workload, WorkloadError> {
        Workload::new(self.config)
    }
}

/// A deterministic synthetic workload.
#[derive(Debug, Clone)]
pub struct Workload {
    config: WorkloadConfig,
}

impl Workload {
    /// Creates a workload from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: WorkloadConfig) -> Result<Self, WorkloadError> {
        if config.streams == 0 {
            return Err(WorkloadError::InvalidConfig(
                "streams must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&config.dependency_ratio) {
            return Err(WorkloadError::InvalidConfig(format!(
                "dependency_ratio must be in [0, 1], got {}",
                config.dependency_ratio
            )));
        }
        if config.spacing.lt(Duration::ZERO) {
            return Err(WorkloadError::InvalidConfig(
                "spacing must not be negative".to_string(),
            ));
        }
        Ok(Self { config })
    }

    /// Creates a workload builder.
    #[must_use]
    pub fn builder() -> WorkloadBuilder {
        WorkloadBuilder::new()
    }

    /// Returns the workload configuration.
    #[must_use]
    pub const fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    /// Total number of operations across all streams.
    #[must_use]
    pub fn operation_count(&self) -> u64 {
        u64::from(self.config.streams) * self.config.operations_per_stream
    }

    /// Generates every operation of one stream, in timestamp order, before
    /// any time remapping.
    #[must_use]
    pub fn operations(&self, stream: u32) -> Vec<Operation> {
        let config = &self.config;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(u64::from(stream)));
        let first_id = u64::from(stream) * config.operations_per_stream;
        let mut last_dependency = Instant::from_nano(0);

        let mut operations = Vec::new();
        let mut timestamp = config.first_timestamp;
        for i in 0..config.operations_per_stream {
            let is_dependency = rng.gen::<f64>() < config.dependency_ratio;
            let kind = if is_dependency { KIND_WRITE } else { KIND_READ };

            let mut payload = vec![0_u8; config.payload_size];
            rng.fill(payload.as_mut_slice());

            operations.push(
                Operation::new(OperationId::new(first_id + i), kind, timestamp)
                    .with_dependency_time(last_dependency)
                    .with_payload(Bytes::from(payload)),
            );

            if is_dependency {
                last_dependency = timestamp;
            }
            timestamp = timestamp.plus(config.spacing);
        }
        operations
    }

    /// Builds one stream definition per stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured time mapping is invalid.
    pub fn stream_definitions(&self) -> Result<Vec<WorkloadStreamDefinition>, WorkloadError> {
        (0..self.config.streams)
            .map(|stream| self.stream_definition(stream))
            .collect()
    }

    fn stream_definition(&self, stream: u32) -> Result<WorkloadStreamDefinition, WorkloadError> {
        let operations = self.operations(stream);
        let operations: Vec<Operation> = match self.config.time_mapping {
            None => operations,
            Some(TimeMapping {
                start_time,
                compression_ratio: None,
            }) => TimeMappingGenerator::new(operations.into_iter(), start_time).collect(),
            Some(TimeMapping {
                start_time,
                compression_ratio: Some(ratio),
            }) => {
                TimeMappingGenerator::with_compression(operations.into_iter(), start_time, ratio)?
                    .collect()
            }
        };

        let (dependency, non_dependency): (Vec<Operation>, Vec<Operation>) = operations
            .into_iter()
            .partition(|op| op.kind == KIND_WRITE);
        Ok(WorkloadStreamDefinition::new(dependency, non_dependency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_is_repeatable() {
        let a = Workload::builder().seed(42).operations_per_stream(100).build().unwrap();
        let b = Workload::builder().seed(42).operations_per_stream(100).build().unwrap();
        assert_eq!(a.operations(0), b.operations(0));

        let c = Workload::builder().seed(43).operations_per_stream(100).build().unwrap();
        assert_ne!(a.operations(0), c.operations(0));
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let workload = Workload::builder()
            .operations_per_stream(50)
            .spacing(Duration::from_milli(3))
            .first_timestamp(Instant::from_milli(10))
            .build()
            .unwrap();

        let ops = workload.operations(0);
        assert_eq!(ops.len(), 50);
        assert_eq!(ops[0].timestamp(), Instant::from_milli(10));
        assert!(ops.windows(2).all(|w| w[0].timestamp().lt(w[1].timestamp())));
    }

    #[test]
    fn test_dependency_ratio_extremes() {
        let all_writes = Workload::builder()
            .operations_per_stream(20)
            .dependency_ratio(1.0)
            .build()
            .unwrap();
        assert!(all_writes.operations(0).iter().all(|op| op.kind == KIND_WRITE));

        let all_reads = Workload::builder()
            .operations_per_stream(20)
            .dependency_ratio(0.0)
            .build()
            .unwrap();
        assert!(all_reads.operations(0).iter().all(|op| op.kind == KIND_READ));
    }

    #[test]
    fn test_stream_ids_do_not_overlap() {
        let workload = Workload::builder()
            .streams(2)
            .operations_per_stream(10)
            .build()
            .unwrap();
        let first = workload.operations(0);
        let second = workload.operations(1);
        assert_eq!(first.last().unwrap().id.get(), 9);
        assert_eq!(second.first().unwrap().id.get(), 10);
        assert_eq!(workload.operation_count(), 20);
    }

    #[test]
    fn test_stream_definition_splits_by_kind() {
        let workload = Workload::builder()
            .seed(9)
            .operations_per_stream(200)
            .dependency_ratio(0.5)
            .build()
            .unwrap();
        let expected = workload.operations(0);

        let mut definitions = workload.stream_definitions().unwrap();
        assert_eq!(definitions.len(), 1);
        let (dependency, non_dependency) = definitions.remove(0).into_parts();
        let dependency: Vec<Operation> = dependency.collect();
        let non_dependency: Vec<Operation> = non_dependency.collect();

        assert_eq!(dependency.len() + non_dependency.len(), expected.len());
        assert!(dependency.iter().all(|op| op.kind == KIND_WRITE));
        assert!(non_dependency.iter().all(|op| op.kind == KIND_READ));
    }

    #[test]
    fn test_time_mapping_applies_to_streams() {
        let workload = Workload::builder()
            .operations_per_stream(4)
            .dependency_ratio(1.0)
            .spacing(Duration::from_milli(100))
            .time_mapping(Instant::from_milli(5_000), Some(0.5))
            .build()
            .unwrap();

        let mut definitions = workload.stream_definitions().unwrap();
        let (dependency, _) = definitions.remove(0).into_parts();
        let starts: Vec<i64> = dependency
            .map(|op| op.scheduled_start_time().as_milli())
            .collect();
        assert_eq!(starts, vec![5_000, 5_050, 5_100, 5_150]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(Workload::builder().streams(0).build().is_err());
        assert!(Workload::builder().dependency_ratio(1.5).build().is_err());
        let bad_ratio = Workload::builder()
            .time_mapping(Instant::from_milli(0), Some(-1.0))
            .build()
            .unwrap();
        assert!(bad_ratio.stream_definitions().is_err());
    }
}
