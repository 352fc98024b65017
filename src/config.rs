//! Coordinator configuration (C10): the construction-time record from §6,
//! validated once when built and then shared read-only by every call the
//! coordinator serves.

use serde::{Deserialize, Serialize};

use crate::error::{CoordinatorError, Result};

/// Governs whether (and when) a scope activates the synchronization bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Activate synchronization even for "empty" scopes (`SUPPORTS`/`NOT_SUPPORTED`/`NEVER`
    /// with no existing transaction).
    Always,
    /// Only activate synchronization when an actual physical transaction is
    /// active. The default.
    OnActualTransaction,
    /// Never activate synchronization at all.
    Never,
}

/// Immutable, validated construction-time configuration for a
/// [`crate::coordinator::TransactionCoordinator`]. See the §6 table in
/// `SPEC_FULL.md` for the effect of each option.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub(crate) sync_mode: SyncMode,
    pub(crate) default_timeout_seconds: i64,
    pub(crate) nested_allowed: bool,
    pub(crate) validate_existing_transaction: bool,
    pub(crate) global_rollback_on_participation_failure: bool,
    pub(crate) fail_early_on_global_rollback_only: bool,
    pub(crate) rollback_on_commit_failure: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::OnActualTransaction,
            default_timeout_seconds: -1,
            nested_allowed: true,
            validate_existing_transaction: false,
            global_rollback_on_participation_failure: false,
            fail_early_on_global_rollback_only: false,
            rollback_on_commit_failure: false,
        }
    }
}

impl CoordinatorConfig {
    pub fn builder() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::default()
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    pub fn default_timeout_seconds(&self) -> i64 {
        self.default_timeout_seconds
    }

    pub fn nested_allowed(&self) -> bool {
        self.nested_allowed
    }

    pub fn validate_existing_transaction(&self) -> bool {
        self.validate_existing_transaction
    }

    pub fn global_rollback_on_participation_failure(&self) -> bool {
        self.global_rollback_on_participation_failure
    }

    pub fn fail_early_on_global_rollback_only(&self) -> bool {
        self.fail_early_on_global_rollback_only
    }

    pub fn rollback_on_commit_failure(&self) -> bool {
        self.rollback_on_commit_failure
    }
}

/// Fluent builder for [`CoordinatorConfig`], validated at [`build`](Self::build).
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfigBuilder {
    inner: CoordinatorConfig,
}

impl Default for CoordinatorConfigBuilder {
    fn default() -> Self {
        Self { inner: CoordinatorConfig::default() }
    }
}

impl CoordinatorConfigBuilder {
    pub fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.inner.sync_mode = mode;
        self
    }

    pub fn default_timeout_seconds(mut self, seconds: i64) -> Self {
        self.inner.default_timeout_seconds = seconds;
        self
    }

    pub fn nested_allowed(mut self, allowed: bool) -> Self {
        self.inner.nested_allowed = allowed;
        self
    }

    pub fn validate_existing_transaction(mut self, validate: bool) -> Self {
        self.inner.validate_existing_transaction = validate;
        self
    }

    pub fn global_rollback_on_participation_failure(mut self, enabled: bool) -> Self {
        self.inner.global_rollback_on_participation_failure = enabled;
        self
    }

    pub fn fail_early_on_global_rollback_only(mut self, enabled: bool) -> Self {
        self.inner.fail_early_on_global_rollback_only = enabled;
        self
    }

    pub fn rollback_on_commit_failure(mut self, enabled: bool) -> Self {
        self.inner.rollback_on_commit_failure = enabled;
        self
    }

    pub fn build(self) -> Result<CoordinatorConfig> {
        if self.inner.default_timeout_seconds < -1 {
            return Err(CoordinatorError::InvalidTimeout(self.inner.default_timeout_seconds));
        }
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds() {
        let config = CoordinatorConfig::builder().build().unwrap();
        assert_eq!(config.sync_mode(), SyncMode::OnActualTransaction);
        assert_eq!(config.default_timeout_seconds(), -1);
        assert!(config.nested_allowed());
    }

    #[test]
    fn timeout_below_negative_one_is_rejected() {
        let err = CoordinatorConfig::builder()
            .default_timeout_seconds(-2)
            .build()
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidTimeout(-2)));
    }

    #[test]
    fn builder_threads_every_option_through() {
        let config = CoordinatorConfig::builder()
            .sync_mode(SyncMode::Always)
            .default_timeout_seconds(30)
            .nested_allowed(false)
            .validate_existing_transaction(true)
            .global_rollback_on_participation_failure(true)
            .fail_early_on_global_rollback_only(true)
            .rollback_on_commit_failure(true)
            .build()
            .unwrap();

        assert_eq!(config.sync_mode(), SyncMode::Always);
        assert_eq!(config.default_timeout_seconds(), 30);
        assert!(!config.nested_allowed());
        assert!(config.validate_existing_transaction());
        assert!(config.global_rollback_on_participation_failure());
        assert!(config.fail_early_on_global_rollback_only());
        assert!(config.rollback_on_commit_failure());
    }
}
