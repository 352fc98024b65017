//! The caller-declared description of desired transactional behavior (C6).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Propagation behavior: how a requested scope relates to any existing transaction
/// already active on the current flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Propagation {
    /// Join an existing transaction, or start a new one if none is active.
    Required,
    /// Join an existing transaction if one is active; otherwise run non-transactionally.
    Supports,
    /// Join an existing transaction; fail if none is active.
    Mandatory,
    /// Always start a new, independent physical transaction, suspending any existing one.
    RequiresNew,
    /// Run non-transactionally, suspending any existing transaction.
    NotSupported,
    /// Run non-transactionally; fail if a transaction is already active.
    Never,
    /// Execute within a nested transaction (a savepoint) if one is active, otherwise
    /// behave like `Required`.
    Nested,
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Required => "REQUIRED",
            Self::Supports => "SUPPORTS",
            Self::Mandatory => "MANDATORY",
            Self::RequiresNew => "REQUIRES_NEW",
            Self::NotSupported => "NOT_SUPPORTED",
            Self::Never => "NEVER",
            Self::Nested => "NESTED",
        };
        f.write_str(name)
    }
}

/// Isolation level requested for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Isolation {
    /// Defer to whatever the resource manager's default is.
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl Default for Isolation {
    fn default() -> Self {
        Self::Default
    }
}

/// A predicate deciding whether a given error should force a rollback.
///
/// Held as a cloneable, shared closure so a `Definition` can be cheaply cloned and
/// passed across suspend/resume boundaries.
#[derive(Clone)]
pub struct RollbackRule(Arc<dyn Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync>);

impl RollbackRule {
    /// Wraps a predicate function as a rollback rule.
    pub fn new(
        predicate: impl Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(predicate))
    }

    /// The default rule: roll back on every error, matching the coordinator's
    /// unconditional rollback-on-failure behavior.
    pub fn rollback_on_any() -> Self {
        Self::new(|_| true)
    }

    pub fn matches(&self, error: &(dyn std::error::Error + 'static)) -> bool {
        (self.0)(error)
    }
}

impl fmt::Debug for RollbackRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RollbackRule(..)")
    }
}

/// Immutable description of the transactional semantics a caller wants.
///
/// Built through [`DefinitionBuilder`] so call sites read as a fluent statement of
/// intent rather than a struct literal with positional-feeling fields.
#[derive(Debug, Clone)]
pub struct Definition {
    pub(crate) propagation: Propagation,
    pub(crate) isolation: Isolation,
    /// `-1` means "defer to the coordinator's configured default".
    pub(crate) timeout_seconds: i64,
    pub(crate) read_only: bool,
    pub(crate) name: Option<String>,
    pub(crate) rollback_rule: RollbackRule,
}

impl Default for Definition {
    fn default() -> Self {
        Self {
            propagation: Propagation::Required,
            isolation: Isolation::Default,
            timeout_seconds: -1,
            read_only: false,
            name: None,
            rollback_rule: RollbackRule::rollback_on_any(),
        }
    }
}

impl Definition {
    pub fn builder() -> DefinitionBuilder {
        DefinitionBuilder::new()
    }

    pub fn propagation(&self) -> Propagation {
        self.propagation
    }

    pub fn isolation(&self) -> Isolation {
        self.isolation
    }

    pub fn timeout_seconds(&self) -> i64 {
        self.timeout_seconds
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether `error` should cause a rollback under this definition's rollback rule.
    pub fn should_rollback_on(&self, error: &(dyn std::error::Error + 'static)) -> bool {
        self.rollback_rule.matches(error)
    }
}

/// Fluent builder for [`Definition`].
#[derive(Debug, Clone)]
pub struct DefinitionBuilder {
    inner: Definition,
}

impl Default for DefinitionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DefinitionBuilder {
    pub fn new() -> Self {
        Self { inner: Definition::default() }
    }

    pub fn propagation(mut self, propagation: Propagation) -> Self {
        self.inner.propagation = propagation;
        self
    }

    pub fn isolation(mut self, isolation: Isolation) -> Self {
        self.inner.isolation = isolation;
        self
    }

    /// `-1` defers to the coordinator's configured default timeout.
    pub fn timeout_seconds(mut self, timeout_seconds: i64) -> Self {
        self.inner.timeout_seconds = timeout_seconds;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.inner.read_only = read_only;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner.name = Some(name.into());
        self
    }

    pub fn rollback_rule(mut self, rule: RollbackRule) -> Self {
        self.inner.rollback_rule = rule;
        self
    }

    pub fn build(self) -> Definition {
        self.inner
    }
}
