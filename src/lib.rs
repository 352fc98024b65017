//! A generic, resource-agnostic transaction coordination core.
//!
//! This crate does not talk to any particular database or message broker. It
//! provides the propagation/isolation vocabulary, the coordinator that drives
//! commit and rollback through a pluggable [`manager::ResourceManager`], and the
//! supporting registry, synchronization bus, and resource-holder bookkeeping a
//! resource manager needs to implement transactional participation correctly.
//!
//! Transactional context is carried explicitly through a [`flow::Flow`] value
//! rather than through thread-local storage, so callers choose their own
//! concurrency model instead of inheriting one from this crate.

// Re-export the primary public API.
pub use config::{CoordinatorConfig, CoordinatorConfigBuilder, SyncMode};
pub use coordinator::TransactionCoordinator;
pub use definition::{Definition, DefinitionBuilder, Isolation, Propagation, RollbackRule};
pub use error::{CoordinatorError, Result, SimpleResourceError};
pub use flow::{BoundResource, Flow, ResourceKey};
pub use holder::{ManagedResource, ResourceHolderSupport};
pub use manager::{ResourceManager, SuspendedTransaction, TransactionObject};
pub use savepoint::{Savepoint, SavepointManager};
pub use status::TransactionStatus;
pub use synchronization::{CompletionStatus, Synchronization};

pub mod config; // Coordinator configuration
pub mod coordinator; // The propagation/commit/rollback state machine
pub mod definition; // Propagation, isolation, and the transaction definition record
pub mod error; // Crate-wide error taxonomy
pub mod flow; // Flow-local registry and per-flow attributes
pub mod holder; // Resource-holder base
pub mod manager; // The pluggable resource-manager template
pub mod savepoint; // Savepoint abstraction
pub mod status; // Per-invocation transaction status handle
pub mod synchronization; // The synchronization bus

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

/// Commonly paired imports for implementing a [`manager::ResourceManager`].
pub mod prelude {
    pub use crate::config::{CoordinatorConfig, SyncMode};
    pub use crate::coordinator::TransactionCoordinator;
    pub use crate::definition::{Definition, Isolation, Propagation};
    pub use crate::error::{CoordinatorError, Result};
    pub use crate::flow::{BoundResource, Flow, ResourceKey};
    pub use crate::holder::{ManagedResource, ResourceHolderSupport};
    pub use crate::manager::{ResourceManager, TransactionObject};
    pub use crate::savepoint::{Savepoint, SavepointManager};
    pub use crate::status::TransactionStatus;
    pub use crate::synchronization::{CompletionStatus, Synchronization};
}

/// The crate's own version, as declared in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The git commit this build was produced from, if the build environment set
/// `GIT_HASH`.
pub fn git_hash() -> String {
    std::env::var("GIT_HASH").unwrap_or_else(|_| "unknown".to_string())
}
