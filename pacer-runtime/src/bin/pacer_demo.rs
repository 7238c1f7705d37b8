//! Pacer demo driver.
//!
//! Replays a synthetic workload against an in-process system under test that
//! sleeps for a fixed latency, then prints the results.
//!
//! ```bash
//! pacer-demo --streams 4 --operations 10000 --compression-ratio 0.5
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Duration as StdDuration;

use clap::Parser;
use pacer_core::{Duration, OperationId};
use pacer_runtime::{ChildOperationGenerator, DriverConfig, HandlerError, WorkloadRunner};
use pacer_workload::{Operation, OperationResult, OperationResultReport, KIND_READ, KIND_WRITE};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Pacer demo driver.
#[derive(Parser, Debug)]
#[command(name = "pacer-demo")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of workload streams.
    #[arg(long, default_value = "2")]
    streams: u32,

    /// Operations per stream.
    #[arg(long, default_value = "1000")]
    operations: u64,

    /// Probability that an operation is a dependency (write) operation.
    #[arg(long, default_value = "0.2")]
    dependency_ratio: f64,

    /// Logical spacing between operations, in microseconds.
    #[arg(long, default_value = "1000")]
    spacing_us: i64,

    /// Workload seed.
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Gap scaling applied to the schedule (e.g. 0.5 runs twice as fast).
    #[arg(long)]
    compression_ratio: Option<f64>,

    /// Delay before the first operation, in milliseconds.
    #[arg(long, default_value = "100")]
    start_delay_ms: i64,

    /// Simulated system latency per operation, in microseconds.
    #[arg(long, default_value = "50")]
    latency_us: u64,

    /// Every Nth operation returns a non-zero result code (0 disables).
    #[arg(long, default_value = "0")]
    error_every: u64,

    /// Follow every write with a read of the same key.
    #[arg(long)]
    read_after_write: bool,

    /// Interval between status log lines, in milliseconds.
    #[arg(long)]
    status_interval_ms: Option<u64>,

    /// Log level.
    #[arg(long, default_value = "info")]
    log_level: Level,
}

/// Emits a read after every write.
struct ReadAfterWrite;

impl ChildOperationGenerator for ReadAfterWrite {
    fn child_operations(
        &self,
        completed: &OperationResultReport,
    ) -> Result<Vec<Operation>, HandlerError> {
        let parent = &completed.operation;
        if parent.kind != KIND_WRITE {
            return Ok(Vec::new());
        }
        let read = Operation::new(
            OperationId::new(parent.id.get() | (1 << 63)),
            KIND_READ,
            parent.timestamp(),
        )
        .with_dependency_time(parent.timestamp())
        .with_payload(parent.payload.clone());
        Ok(vec![read])
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = DriverConfig::new()
        .with_stream_count(args.streams)
        .with_operations_per_stream(args.operations)
        .with_dependency_ratio(args.dependency_ratio)
        .with_operation_spacing(Duration::from_micro(args.spacing_us))
        .with_seed(args.seed)
        .with_time_compression_ratio(args.compression_ratio)
        .with_start_delay(Duration::from_milli(args.start_delay_ms))
        .with_status_interval(args.status_interval_ms.map(StdDuration::from_millis));

    let mut runner = WorkloadRunner::new(config)?;
    if args.read_after_write {
        runner = runner.with_child_generator(Arc::new(ReadAfterWrite));
    }

    info!(
        streams = args.streams,
        operations = args.operations,
        compression_ratio = ?args.compression_ratio,
        "starting demo run"
    );

    let latency = StdDuration::from_micros(args.latency_us);
    let error_every = args.error_every;
    let outcome = runner.run_workload(move |operation: &Operation| {
        std::thread::sleep(latency);
        if error_every > 0 && operation.id.get() % error_every == 0 {
            return Ok(OperationResult::error(1));
        }
        Ok(OperationResult::ok(None))
    })?;

    print!("{}", outcome.results);
    for error in &outcome.errors {
        warn!(%error, "reported error");
    }
    if !outcome.is_success() {
        return Err(format!("run failed with {} errors", outcome.errors.len()).into());
    }
    Ok(())
}
