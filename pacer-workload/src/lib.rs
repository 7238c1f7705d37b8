//! Pacer Workload: operations, workload streams and time remapping.
//!
//! A workload is replayed as one or more streams. Each stream is a pair of
//! timestamp-ordered operation sequences:
//!
//! - **Dependency operations** produce side effects that later operations must
//!   observe, so their initiation is reported to a completion-time tracker.
//! - **Non-dependency operations** carry no such obligation.
//!
//! # Example
//!
//! ```
//! use pacer_core::{Duration, Instant};
//! use pacer_workload::Workload;
//!
//! let workload = Workload::builder()
//!     .seed(42)
//!     .streams(2)
//!     .operations_per_stream(100)
//!     .spacing(Duration::from_milli(5))
//!     .time_mapping(Instant::from_milli(1_000), Some(0.5))
//!     .build()
//!     .unwrap();
//!
//! let streams = workload.stream_definitions().unwrap();
//! assert_eq!(streams.len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod generator;
mod operation;
mod stream;
mod workload;

pub use generator::TimeMappingGenerator;
pub use operation::{Operation, OperationResult, OperationResultReport};
pub use stream::{OperationIter, WorkloadStreamDefinition};
pub use workload::{
    TimeMapping, Workload, WorkloadBuilder, WorkloadConfig, WorkloadError, KIND_READ, KIND_WRITE,
};
