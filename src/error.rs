//! Crate-wide error taxonomy for the transaction coordinator.
//!
//! Every fallible entry point on [`crate::coordinator::TransactionCoordinator`] returns
//! [`Result<T>`], so resource-manager failures compose with `?` the same way any other
//! fallible call in this codebase does.

use std::fmt;

use crate::definition::{Isolation, Propagation};

/// Convenience alias for coordinator results.
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// The single error type surfaced by the coordinator.
///
/// Each variant carries enough context to build an actionable message without the
/// caller needing to reach back into the coordinator's internal state.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// A lifecycle call was made that the current state does not permit: committing
    /// or rolling back a completed status, `MANDATORY` with no existing transaction,
    /// `NEVER` with an existing transaction, or binding an already-bound resource key.
    #[error("illegal transaction state: {0}")]
    IllegalTransactionState(String),

    /// `Definition::timeout_seconds` was less than `-1`.
    #[error("invalid transaction timeout: {0} (must be >= -1)")]
    InvalidTimeout(i64),

    /// `NESTED` propagation was requested but either `nested_allowed` is `false` on
    /// the coordinator, or the transaction object cannot supply a savepoint manager.
    #[error("nested transactions are not supported here")]
    NestedNotSupported,

    /// `Propagation::NotSupported`/`RequiresNew` needed to suspend the active
    /// transaction but the resource manager does not implement suspension.
    #[error("transaction suspension is not supported by this resource manager")]
    TransactionSuspensionNotSupported,

    /// A commit was attempted on a transaction that turned out to be (or became)
    /// rollback-only, so the coordinator rolled it back instead of committing it.
    #[error("transaction rolled back because it was marked rollback-only{}", format_name(.name))]
    UnexpectedRollback { name: Option<String> },

    /// The underlying resource manager failed during a begin/commit/rollback/suspend
    /// hook. The wrapped error is the resource manager's own failure.
    #[error("transaction system failure during {operation}: {source}")]
    TransactionSystem {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A [`crate::holder::ResourceHolderSupport`] deadline elapsed before the holder
    /// was released.
    #[error("transaction timed out after its deadline elapsed")]
    TransactionTimedOut,

    /// Joining an existing transaction failed `validate_existing_transaction`
    /// isolation or read-only compatibility checks.
    #[error("{0}")]
    IllegalTransactionUsage(String),
}

fn format_name(name: &Option<String>) -> String {
    match name {
        Some(n) => format!(" (transaction \"{n}\")"),
        None => String::new(),
    }
}

impl CoordinatorError {
    /// Builds an `IllegalTransactionState` error for the classic "no existing
    /// transaction" `MANDATORY` failure.
    pub(crate) fn no_existing_transaction(propagation: Propagation) -> Self {
        Self::IllegalTransactionState(format!(
            "propagation {propagation:?} requires an existing transaction, but none is active"
        ))
    }

    /// Builds an `IllegalTransactionState` error for the classic "existing
    /// transaction found" `NEVER` failure.
    pub(crate) fn existing_transaction_forbidden() -> Self {
        Self::IllegalTransactionState(
            "existing transaction found, but propagation NEVER forbids participation"
                .to_string(),
        )
    }

    pub(crate) fn isolation_mismatch(requested: Isolation, active: Isolation) -> Self {
        Self::IllegalTransactionUsage(format!(
            "cannot join existing transaction: isolation level {requested:?} does not match \
             the active isolation level {active:?}"
        ))
    }

    pub(crate) fn read_only_mismatch() -> Self {
        Self::IllegalTransactionUsage(
            "cannot join existing transaction: definition requests a writable transaction but \
             the active transaction is read-only"
                .to_string(),
        )
    }

    pub(crate) fn already_completed() -> Self {
        Self::IllegalTransactionState(
            "transaction status has already completed; commit/rollback may only run once"
                .to_string(),
        )
    }

    pub(crate) fn already_bound() -> Self {
        Self::IllegalTransactionState(
            "a resource is already bound to this key for the current flow".to_string(),
        )
    }

    pub(crate) fn not_bound() -> Self {
        Self::IllegalTransactionState(
            "no resource is bound to this key for the current flow".to_string(),
        )
    }

    pub(crate) fn synchronization_already_active() -> Self {
        Self::IllegalTransactionState(
            "synchronization is already active for the current flow".to_string(),
        )
    }

    pub(crate) fn synchronization_not_active() -> Self {
        Self::IllegalTransactionState(
            "synchronization is not active for the current flow".to_string(),
        )
    }

    pub(crate) fn resource_manager(operation: &'static str, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::TransactionSystem { operation, source: source.into() }
    }
}

/// A lightweight error used by the in-crate test harness and by downstream
/// resource-manager implementations that do not need a richer error type.
#[derive(Debug)]
pub struct SimpleResourceError(pub String);

impl fmt::Display for SimpleResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SimpleResourceError {}

impl SimpleResourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
