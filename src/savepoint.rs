//! Savepoint interface (C4): abstract create / rollback-to / release of
//! intra-transaction savepoints.

use std::any::Any;

use crate::error::Result;

/// An opaque savepoint handle returned by a [`SavepointManager`]. The coordinator
/// never inspects its contents; it only ever hands it back to the same manager
/// that produced it.
pub type Savepoint = Box<dyn Any + Send>;

/// Implemented by transaction objects that can create intra-transaction
/// savepoints. A resource manager whose transaction object does not implement
/// this trait causes `NESTED` propagation to fail with
/// [`crate::error::CoordinatorError::NestedNotSupported`].
pub trait SavepointManager: Send {
    fn create_savepoint(&mut self) -> Result<Savepoint>;
    fn rollback_to_savepoint(&mut self, savepoint: Savepoint) -> Result<()>;
    fn release_savepoint(&mut self, savepoint: Savepoint) -> Result<()>;
}
