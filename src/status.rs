//! Transaction status (C5): the per-invocation handle a caller holds between
//! `get_transaction` and the matching `commit`/`rollback`.

use crate::error::{CoordinatorError, Result};
use crate::manager::TransactionObject;
use crate::savepoint::Savepoint;
use crate::synchronization::Synchronization;

/// Everything suspended when an outer scope is displaced by an inner one (§4.5d),
/// owned by the `Status` that caused the suspension and drained exactly once on
/// scope exit.
pub(crate) struct SuspendedResources {
    pub(crate) tx_object: Option<Box<dyn TransactionObject>>,
    pub(crate) suspended_transaction: Option<Box<dyn std::any::Any + Send>>,
    pub(crate) synchronizations: Option<Vec<Box<dyn Synchronization>>>,
    pub(crate) name: Option<String>,
    pub(crate) read_only: bool,
    pub(crate) isolation: Option<crate::definition::Isolation>,
    pub(crate) was_active: bool,
}

/// Per-invocation handle returned by [`crate::coordinator::TransactionCoordinator::get_transaction`].
///
/// Exclusively owned by the caller between enter and exit; passed by value into
/// the matching `commit`/`rollback` call, which consumes it.
pub struct TransactionStatus {
    pub(crate) tx_object: Option<Box<dyn TransactionObject>>,
    pub(crate) new_transaction: bool,
    pub(crate) new_synchronization: bool,
    pub(crate) read_only: bool,
    pub(crate) local_rollback_only: bool,
    pub(crate) completed: bool,
    pub(crate) savepoint: Option<Savepoint>,
    pub(crate) suspended_resources: Option<SuspendedResources>,
    /// Name carried for diagnostics and for `before_commit`/error messages.
    pub(crate) name: Option<String>,
}

impl TransactionStatus {
    pub(crate) fn new(
        tx_object: Option<Box<dyn TransactionObject>>,
        new_transaction: bool,
        new_synchronization: bool,
        read_only: bool,
        name: Option<String>,
    ) -> Self {
        Self {
            tx_object,
            new_transaction,
            new_synchronization,
            read_only,
            local_rollback_only: false,
            completed: false,
            savepoint: None,
            suspended_resources: None,
            name,
        }
    }

    /// `true` if this scope is responsible for physically committing or rolling
    /// back the underlying transaction; `false` if it merely participates.
    ///
    /// An empty scope (no `tx_object` at all, e.g. `SUPPORTS`/`NOT_SUPPORTED`/`NEVER`
    /// with nothing active) is never "new" in this sense even though it sets the
    /// `new_transaction` flag for synchronization-activation bookkeeping — there is
    /// no physical transaction underneath it to commit or roll back.
    pub fn is_new_transaction(&self) -> bool {
        self.new_transaction && self.tx_object.is_some()
    }

    pub fn has_savepoint(&self) -> bool {
        self.savepoint.is_some()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// `local_rollback_only || the underlying transaction's own global flag`.
    pub fn is_rollback_only(&self) -> bool {
        self.local_rollback_only || self.is_global_rollback_only()
    }

    pub(crate) fn is_global_rollback_only(&self) -> bool {
        self.tx_object
            .as_ref()
            .map(|tx| tx.is_global_rollback_only())
            .unwrap_or(false)
    }

    /// Marks this status rollback-only. Irreversible: there is no way to clear it
    /// short of rolling back, matching the one-way nature of the flag in §3.
    pub fn set_rollback_only(&mut self) {
        self.local_rollback_only = true;
    }

    pub(crate) fn is_local_rollback_only(&self) -> bool {
        self.local_rollback_only
    }

    /// Flushes any buffered writes through bound synchronizations. A no-op unless
    /// the resource manager's synchronizations implement
    /// [`Synchronization::flush`].
    pub fn flush(&self, flow: &mut crate::flow::Flow) {
        flow.fire_flush();
    }

    pub fn tx_object(&self) -> Option<&dyn TransactionObject> {
        self.tx_object.as_deref()
    }

    pub(crate) fn tx_object_mut(&mut self) -> Option<&mut (dyn TransactionObject + 'static)> {
        self.tx_object.as_deref_mut()
    }

    /// Creates and holds a savepoint against the underlying transaction object,
    /// failing with [`CoordinatorError::NestedNotSupported`] if it implements no
    /// savepoint manager.
    pub fn create_and_hold_savepoint(&mut self) -> Result<()> {
        let savepoint = self.require_savepoint_manager()?.create_savepoint()?;
        self.savepoint = Some(savepoint);
        Ok(())
    }

    /// Rolls back to the held savepoint and releases it in one step, clearing the
    /// stored savepoint.
    pub fn rollback_to_held_savepoint(&mut self) -> Result<()> {
        let savepoint = self
            .savepoint
            .take()
            .ok_or_else(|| CoordinatorError::IllegalTransactionState("no savepoint is held".to_string()))?;
        self.require_savepoint_manager()?.rollback_to_savepoint(savepoint)
    }

    /// Releases the held savepoint, clearing it.
    pub fn release_held_savepoint(&mut self) -> Result<()> {
        let savepoint = self
            .savepoint
            .take()
            .ok_or_else(|| CoordinatorError::IllegalTransactionState("no savepoint is held".to_string()))?;
        self.require_savepoint_manager()?.release_savepoint(savepoint)
    }

    fn require_savepoint_manager(&mut self) -> Result<&mut dyn crate::savepoint::SavepointManager> {
        self.tx_object
            .as_deref_mut()
            .and_then(|tx| tx.as_savepoint_manager())
            .ok_or(CoordinatorError::NestedNotSupported)
    }

    pub(crate) fn mark_completed(&mut self) {
        self.completed = true;
    }
}
