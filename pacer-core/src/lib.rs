//! Pacer Core - temporal value types and strongly-typed identifiers for Pacer.
//!
//! This crate provides the value types every other Pacer crate shares. It does
//! NOT provide scheduling, execution, or metrics - those live in
//! `pacer-runtime`.
//!
//! # Design Principles
//!
//! - **Nanosecond precision**: every point in time and every span is an `i64`
//!   count of nanoseconds; unit conversions are exact integer scaling
//! - **Strongly-typed IDs**: prevent mixing up an `OperationId` with a `StreamId`
//! - **No unsafe code**: safety > performance

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod temporal;
mod types;

pub use error::{Error, Result};
pub use temporal::{Duration, Instant};
pub use types::{OperationId, StreamId};
