//! Resource-manager template (C7): the pluggable hooks a coordinator drives to
//! obtain, begin, suspend, resume, commit, and roll back a physical transaction.
//!
//! Modeled as a trait with default method bodies for every *optional* hook — this
//! ecosystem's idiom for the template-method shape the source uses virtual
//! inheritance for. Only `get_transaction`, `begin`, `commit`, and `rollback` are
//! mandatory; everything else falls back to the behavior documented on the method.

use std::any::Any;

use crate::definition::Definition;
use crate::error::{CoordinatorError, Result};
use crate::flow::Flow;
use crate::savepoint::SavepointManager;
use crate::status::TransactionStatus;
use crate::synchronization::{CompletionStatus, Synchronization};

/// The opaque handle a [`ResourceManager`] produces and the coordinator passes
/// back on every subsequent hook call, without introspecting it beyond the two
/// optional capabilities declared here.
pub trait TransactionObject: Any + Send {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Whether the *underlying* transaction (not just this `Status`) has been
    /// marked rollback-only, e.g. because a participant downstream called
    /// `set_rollback_only` on the resource manager directly. Defaults to `false`.
    fn is_global_rollback_only(&self) -> bool {
        false
    }

    /// Exposes savepoint support if the underlying transaction has any. Returning
    /// `None` (the default) causes `NESTED` propagation to fail with
    /// [`CoordinatorError::NestedNotSupported`] whenever
    /// [`ResourceManager::use_savepoint_for_nested_transaction`] is `true`.
    fn as_savepoint_manager(&mut self) -> Option<&mut dyn SavepointManager> {
        None
    }
}

/// The pluggable hooks the coordinator drives. Implement this once per
/// transactional resource (a connection pool, a JTA `UserTransaction`, a message
/// broker session) and hand it to [`crate::coordinator::TransactionCoordinator::new`].
pub trait ResourceManager: Send + Sync {
    /// Obtains (but does not yet begin) a transaction object for the current flow.
    /// Called on every `get_transaction`, participating or not. Implementations that
    /// support participation inspect `flow` for an already-bound resource (e.g. a
    /// connection holder left behind by an enclosing scope) and reflect it in the
    /// returned object so [`Self::is_existing_transaction`] can report it.
    fn get_transaction(&self, flow: &mut Flow) -> Result<Box<dyn TransactionObject>>;

    /// Physically begins a transaction on `tx_object` per `definition`.
    fn begin(&self, tx_object: &mut dyn TransactionObject, definition: &Definition) -> Result<()>;

    /// Physically commits the transaction carried by `status`.
    fn commit(&self, status: &mut TransactionStatus) -> Result<()>;

    /// Physically rolls back the transaction carried by `status`.
    fn rollback(&self, status: &mut TransactionStatus) -> Result<()>;

    /// Whether `tx_object` (freshly produced by `get_transaction`) already
    /// represents an active transaction on the current flow.
    fn is_existing_transaction(&self, _tx_object: &dyn TransactionObject) -> bool {
        false
    }

    /// Whether `NESTED` propagation should be realized as a savepoint (the
    /// default) rather than as an independent physical transaction.
    fn use_savepoint_for_nested_transaction(&self) -> bool {
        true
    }

    /// Detaches `tx_object`'s bound resources from `flow` so a new transaction can
    /// begin in its place, returning an opaque blob to hand back to [`Self::resume`].
    /// The default fails with [`CoordinatorError::TransactionSuspensionNotSupported`].
    fn suspend(
        &self,
        _flow: &mut Flow,
        _tx_object: &mut dyn TransactionObject,
    ) -> Result<Box<dyn Any + Send>> {
        Err(CoordinatorError::TransactionSuspensionNotSupported)
    }

    /// Reattaches to `flow` the resources previously detached by [`Self::suspend`].
    fn resume(
        &self,
        _flow: &mut Flow,
        _tx_object: &mut dyn TransactionObject,
        _suspended: Box<dyn Any + Send>,
    ) -> Result<()> {
        Err(CoordinatorError::TransactionSuspensionNotSupported)
    }

    /// Marks the transaction carried by `status` rollback-only without rolling it
    /// back immediately, used when a participant fails but does not own the
    /// physical transaction. Defaults to failing, matching a resource manager that
    /// offers no way to mark an existing transaction rollback-only out-of-band.
    fn set_rollback_only(&self, _status: &mut TransactionStatus) -> Result<()> {
        Err(CoordinatorError::IllegalTransactionState(
            "this resource manager cannot mark an existing transaction rollback-only".to_string(),
        ))
    }

    /// Whether the coordinator should still attempt a physical commit when the
    /// transaction is globally rollback-only. Defaults to `false` (roll back
    /// instead), matching every mainstream relational resource manager.
    fn should_commit_on_global_rollback_only(&self) -> bool {
        false
    }

    /// Hook run immediately before synchronizations' `before_commit`/
    /// `before_completion`. Useful for resource managers that need to flush
    /// buffered writes. No-op by default.
    fn prepare_for_commit(&self, _status: &mut TransactionStatus) {}

    /// Always run on scope exit when `status.is_new_transaction()`, regardless of
    /// whether commit or rollback (or neither, on an early failure) happened.
    /// Implementations typically unbind their resource from `flow` here.
    fn cleanup_after_completion(&self, _flow: &mut Flow, _tx_object: &mut dyn TransactionObject) {}

    /// Registers synchronizations to fire `after_completion` against an existing
    /// (participated-in, not owned) transaction. The default matches the common
    /// case of a resource manager with no after-the-fact completion hook: fire
    /// immediately with [`CompletionStatus::Unknown`], since this scope cannot
    /// observe when the owning scope actually completes. Failures are logged and
    /// swallowed, matching `after_completion`'s general error policy.
    fn register_after_completion_with_existing_transaction(
        &self,
        _tx_object: &mut dyn TransactionObject,
        synchronizations: &mut [Box<dyn Synchronization>],
    ) -> Result<()> {
        for sync in synchronizations.iter_mut() {
            if let Err(err) = sync.after_completion(CompletionStatus::Unknown) {
                tracing::warn!(error = %err, "synchronization after_completion failed; ignoring");
            }
        }
        Ok(())
    }
}

/// The opaque blob handed from [`ResourceManager::suspend`] to [`ResourceManager::resume`].
pub type SuspendedTransaction = Box<dyn Any + Send>;
