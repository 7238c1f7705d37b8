//! Causal merge of a stream's two operation sequences.
//!
//! Operations come out in ascending timestamp order. Every dependency
//! operation's timestamp is submitted to the completion-time writer the moment
//! it is pulled into the lookahead buffer, before it is handed to an executor.
//! Once the dependency sequence runs dry, [`Instant::MAX`] is submitted so that
//! completion time elsewhere can advance past this stream.

use std::iter::Peekable;
use std::sync::Arc;

use pacer_core::Instant;
use pacer_workload::{Operation, OperationIter, WorkloadStreamDefinition};
use tracing::trace;

use crate::coordination::CompletionTimeWriter;
use crate::error::ExecutorError;

/// Merges dependency and non-dependency operations by timestamp while
/// reporting initiated times.
///
/// Holds at most one unconsumed operation per side.
pub struct InitiatedTimeSubmittingOperationRetriever {
    dependency_operations: Peekable<OperationIter>,
    non_dependency_operations: Peekable<OperationIter>,
    next_dependency: Option<Operation>,
    next_non_dependency: Option<Operation>,
    writer: Arc<dyn CompletionTimeWriter>,
}

impl InitiatedTimeSubmittingOperationRetriever {
    /// Creates a retriever over one stream definition.
    #[must_use]
    pub fn new(stream: WorkloadStreamDefinition, writer: Arc<dyn CompletionTimeWriter>) -> Self {
        let (dependency, non_dependency) = stream.into_parts();
        Self {
            dependency_operations: dependency.peekable(),
            non_dependency_operations: non_dependency.peekable(),
            next_dependency: None,
            next_non_dependency: None,
            writer,
        }
    }

    /// Returns true if another operation can be retrieved.
    pub fn has_next_operation(&mut self) -> bool {
        self.next_dependency.is_some()
            || self.next_non_dependency.is_some()
            || self.dependency_operations.peek().is_some()
            || self.non_dependency_operations.peek().is_some()
    }

    /// Returns the operation with the smallest timestamp among both sides.
    ///
    /// On equal timestamps the dependency operation comes first.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Coordination`] if the writer rejects an
    /// initiated time, or [`ExecutorError::RetrieverExhausted`] if nothing is
    /// left to return.
    pub fn next_operation(&mut self) -> Result<Operation, ExecutorError> {
        if self.next_dependency.is_none() {
            if let Some(operation) = self.dependency_operations.next() {
                let initiated = operation.timestamp();
                self.next_dependency = Some(operation);
                trace!(initiated = %initiated, "submitting initiated time");
                self.writer.submit_initiated_time(initiated)?;
                if self.dependency_operations.peek().is_none() {
                    trace!("dependency operations exhausted");
                    self.writer.submit_initiated_time(Instant::MAX)?;
                }
            }
        }

        if self.next_non_dependency.is_none() {
            self.next_non_dependency = self.non_dependency_operations.next();
        }

        match (self.next_dependency.take(), self.next_non_dependency.take()) {
            (Some(dependency), Some(non_dependency)) => {
                if non_dependency.timestamp().lt(dependency.timestamp()) {
                    self.next_dependency = Some(dependency);
                    Ok(non_dependency)
                } else {
                    self.next_non_dependency = Some(non_dependency);
                    Ok(dependency)
                }
            }
            (Some(operation), None) | (None, Some(operation)) => Ok(operation),
            (None, None) => Err(ExecutorError::RetrieverExhausted),
        }
    }
}

impl std::fmt::Debug for InitiatedTimeSubmittingOperationRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitiatedTimeSubmittingOperationRetriever")
            .field("next_dependency", &self.next_dependency)
            .field("next_non_dependency", &self.next_non_dependency)
            .finish_non_exhaustive()
    }
}
