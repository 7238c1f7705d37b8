//! Per-stream operation sequences.

use crate::operation::Operation;

/// A lazily produced, single-pass sequence of operations.
pub type OperationIter = Box<dyn Iterator<Item = Operation> + Send>;

/// The two operation sequences one scheduling thread replays.
///
/// Both sequences are in increasing timestamp order and are consumed exactly
/// once. Neither has to know its length in advance.
pub struct WorkloadStreamDefinition {
    dependency_operations: OperationIter,
    non_dependency_operations: OperationIter,
}

impl WorkloadStreamDefinition {
    /// Creates a stream definition from its dependency and non-dependency
    /// operation sequences.
    #[must_use]
    pub fn new<D, N>(dependency_operations: D, non_dependency_operations: N) -> Self
    where
        D: IntoIterator<Item = Operation>,
        D::IntoIter: Send + 'static,
        N: IntoIterator<Item = Operation>,
        N::IntoIter: Send + 'static,
    {
        Self {
            dependency_operations: Box::new(dependency_operations.into_iter()),
            non_dependency_operations: Box::new(non_dependency_operations.into_iter()),
        }
    }

    /// Creates a stream definition with no operations at all.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(std::iter::empty(), std::iter::empty())
    }

    /// Splits the definition into `(dependency, non_dependency)` sequences.
    #[must_use]
    pub fn into_parts(self) -> (OperationIter, OperationIter) {
        (self.dependency_operations, self.non_dependency_operations)
    }
}

impl std::fmt::Debug for WorkloadStreamDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkloadStreamDefinition").finish_non_exhaustive()
    }
}
