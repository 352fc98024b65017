//! The transaction coordinator (C8): drives the propagation state machine in
//! §4.5 against a [`ResourceManager`], given a [`Flow`] supplying per-flow state
//! and a [`CoordinatorConfig`] fixed at construction time.

use std::sync::Arc;

use crate::config::{CoordinatorConfig, SyncMode};
use crate::definition::{Definition, Propagation};
use crate::error::{CoordinatorError, Result};
use crate::flow::Flow;
use crate::manager::{ResourceManager, TransactionObject};
use crate::status::{SuspendedResources, TransactionStatus};
use crate::synchronization::CompletionStatus;

/// Drives the propagation/commit/rollback workflow for one [`ResourceManager`].
///
/// Stateless beyond `resource_manager` and `config`: every call takes the
/// [`Flow`] it operates against explicitly, so one coordinator safely serves any
/// number of concurrently in-flight flows.
pub struct TransactionCoordinator {
    resource_manager: Arc<dyn ResourceManager>,
    config: CoordinatorConfig,
}

impl TransactionCoordinator {
    pub fn new(resource_manager: Arc<dyn ResourceManager>, config: CoordinatorConfig) -> Self {
        Self { resource_manager, config }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// §6: resolves the effective timeout for `definition`, substituting the
    /// coordinator's configured `default_timeout_seconds` when the definition
    /// defers with `-1`. Returns `definition` unchanged (cloned) otherwise.
    fn determine_timeout(&self, definition: &Definition) -> Definition {
        if definition.timeout_seconds() != -1 {
            return definition.clone();
        }
        let mut resolved = definition.clone();
        resolved.timeout_seconds = self.config.default_timeout_seconds();
        resolved
    }

    /// Requests a transaction scope per `definition` (or the coordinator's
    /// defaults, if `None`), running the full propagation state machine (§4.5).
    pub fn get_transaction(
        &self,
        flow: &mut Flow,
        definition: Option<&Definition>,
    ) -> Result<TransactionStatus> {
        let owned;
        let definition = match definition {
            Some(d) => d,
            None => {
                owned = Definition::default();
                &owned
            }
        };

        if definition.timeout_seconds() < -1 {
            return Err(CoordinatorError::InvalidTimeout(definition.timeout_seconds()));
        }

        tracing::trace!(flow = %flow.id(), propagation = %definition.propagation(), "get_transaction");
        let tx_object = self.resource_manager.get_transaction(flow)?;

        if self.resource_manager.is_existing_transaction(tx_object.as_ref()) {
            return self.handle_existing_transaction(flow, tx_object, definition);
        }

        match definition.propagation() {
            Propagation::Mandatory => {
                Err(CoordinatorError::no_existing_transaction(Propagation::Mandatory))
            }
            Propagation::Required | Propagation::RequiresNew | Propagation::Nested => {
                tracing::debug!(propagation = %definition.propagation(), "starting a new transaction");
                self.start_new_transaction(flow, tx_object, definition, None)
            }
            Propagation::Supports | Propagation::NotSupported | Propagation::Never => {
                self.empty_scope(flow, definition, None)
            }
        }
    }

    fn handle_existing_transaction(
        &self,
        flow: &mut Flow,
        mut tx_object: Box<dyn TransactionObject>,
        definition: &Definition,
    ) -> Result<TransactionStatus> {
        match definition.propagation() {
            Propagation::Never => Err(CoordinatorError::existing_transaction_forbidden()),

            Propagation::NotSupported => {
                tracing::debug!("suspending the current transaction to run non-transactionally");
                let suspended = self.suspend(flow, Some(tx_object))?;
                self.empty_scope(flow, definition, Some(suspended))
            }

            Propagation::RequiresNew => {
                tracing::debug!("suspending the current transaction to start an independent one");
                let suspended = self.suspend(flow, Some(tx_object))?;
                let fresh = match self.resource_manager.get_transaction(flow) {
                    Ok(fresh) => fresh,
                    Err(err) => {
                        self.resume(flow, suspended)?;
                        return Err(err);
                    }
                };
                self.start_new_transaction(flow, fresh, definition, Some(suspended))
            }

            Propagation::Nested => {
                if !self.config.nested_allowed() {
                    return Err(CoordinatorError::NestedNotSupported);
                }
                if self.resource_manager.use_savepoint_for_nested_transaction() {
                    let mut status = TransactionStatus::new(
                        Some(tx_object),
                        false,
                        false,
                        definition.read_only(),
                        definition.name().map(String::from),
                    );
                    status.create_and_hold_savepoint()?;
                    Ok(status)
                } else {
                    let resolved = self.determine_timeout(definition);
                    self.resource_manager.begin(tx_object.as_mut(), &resolved)?;
                    let new_synchronization = self.config.sync_mode() != SyncMode::Never;
                    let mut status = TransactionStatus::new(
                        Some(tx_object),
                        true,
                        new_synchronization,
                        definition.read_only(),
                        definition.name().map(String::from),
                    );
                    self.activate_synchronization(flow, &mut status, definition)?;
                    Ok(status)
                }
            }

            Propagation::Required | Propagation::Supports | Propagation::Mandatory => {
                self.validate_existing_transaction(flow, definition)?;
                let new_synchronization = self.config.sync_mode() != SyncMode::Never;
                let mut status = TransactionStatus::new(
                    Some(tx_object),
                    false,
                    new_synchronization,
                    definition.read_only(),
                    definition.name().map(String::from),
                );
                self.activate_synchronization(flow, &mut status, definition)?;
                Ok(status)
            }
        }
    }

    fn validate_existing_transaction(&self, flow: &Flow, definition: &Definition) -> Result<()> {
        if !self.config.validate_existing_transaction() {
            return Ok(());
        }
        if definition.isolation() != crate::definition::Isolation::Default {
            if let Some(active) = flow.isolation() {
                if active != definition.isolation() {
                    return Err(CoordinatorError::isolation_mismatch(definition.isolation(), active));
                }
            }
        }
        if !definition.read_only() && flow.is_read_only() {
            return Err(CoordinatorError::read_only_mismatch());
        }
        Ok(())
    }

    fn start_new_transaction(
        &self,
        flow: &mut Flow,
        mut tx_object: Box<dyn TransactionObject>,
        definition: &Definition,
        suspended: Option<SuspendedResources>,
    ) -> Result<TransactionStatus> {
        let resolved = self.determine_timeout(definition);
        if let Err(err) = self.resource_manager.begin(tx_object.as_mut(), &resolved) {
            if let Some(suspended) = suspended {
                self.resume(flow, suspended)?;
            }
            return Err(err);
        }

        let new_synchronization = self.config.sync_mode() != SyncMode::Never;
        let mut status = TransactionStatus::new(
            Some(tx_object),
            true,
            new_synchronization,
            definition.read_only(),
            definition.name().map(String::from),
        );
        status.suspended_resources = suspended;
        self.activate_synchronization(flow, &mut status, definition)?;
        Ok(status)
    }

    fn empty_scope(
        &self,
        flow: &mut Flow,
        definition: &Definition,
        suspended: Option<SuspendedResources>,
    ) -> Result<TransactionStatus> {
        if definition.isolation() != crate::definition::Isolation::Default {
            tracing::warn!(
                isolation = ?definition.isolation(),
                "isolation level requested on a scope that will not start an actual transaction",
            );
        }
        let new_synchronization = self.config.sync_mode() == SyncMode::Always;
        let mut status =
            TransactionStatus::new(None, true, new_synchronization, definition.read_only(), definition.name().map(String::from));
        status.suspended_resources = suspended;
        self.activate_synchronization(flow, &mut status, definition)?;
        Ok(status)
    }

    /// §4.5c: activates the synchronization bus for `status`'s scope, but only if
    /// this scope actually owns synchronization activation (`new_synchronization`)
    /// and nothing is active on `flow` yet — an inner scope joining an outer one
    /// must never clobber the outer scope's already-initialized bus.
    fn activate_synchronization(
        &self,
        flow: &mut Flow,
        status: &mut TransactionStatus,
        definition: &Definition,
    ) -> Result<()> {
        if status.new_synchronization && !flow.is_synchronization_active() {
            flow.set_actual_active(status.tx_object().is_some());
            flow.set_isolation(match definition.isolation() {
                crate::definition::Isolation::Default => None,
                isolation => Some(isolation),
            });
            flow.set_read_only(definition.read_only());
            flow.set_tx_name(definition.name().map(String::from));
            flow.init_synchronization()?;
        }
        Ok(())
    }

    /// §4.5d: detaches the currently active transaction (if any) from `flow` so a
    /// new one can run in its place.
    fn suspend(
        &self,
        flow: &mut Flow,
        tx_object: Option<Box<dyn TransactionObject>>,
    ) -> Result<SuspendedResources> {
        let was_active = flow.is_synchronization_active();

        let (name, read_only, isolation, synchronizations) = if was_active {
            flow.fire_suspend();
            let synchronizations = flow.clear_synchronization()?;
            let snapshot = (
                flow.tx_name().map(String::from),
                flow.is_read_only(),
                flow.isolation(),
                Some(synchronizations),
            );
            flow.set_tx_name(None);
            flow.set_read_only(false);
            flow.set_isolation(None);
            flow.set_actual_active(false);
            snapshot
        } else {
            (None, false, None, None)
        };

        let mut tx_object = tx_object;
        let suspended_transaction = match tx_object.as_mut() {
            Some(tx) => match self.resource_manager.suspend(flow, tx.as_mut()) {
                Ok(blob) => Some(blob),
                Err(err) => {
                    // The resource manager refused to suspend; undo the synchronization
                    // detachment above so `flow` is left exactly as it was found.
                    if was_active {
                        flow.set_tx_name(name);
                        flow.set_read_only(read_only);
                        flow.set_isolation(isolation);
                        flow.set_actual_active(true);
                        flow.init_synchronization()?;
                        if let Some(synchronizations) = synchronizations {
                            for sync in synchronizations {
                                flow.register_synchronization(sync)?;
                            }
                        }
                    }
                    return Err(err);
                }
            },
            None => None,
        };

        Ok(SuspendedResources {
            tx_object,
            suspended_transaction,
            synchronizations,
            name,
            read_only,
            isolation,
            was_active,
        })
    }

    /// §4.5d: the inverse of [`Self::suspend`], re-attaching whatever was
    /// previously detached.
    fn resume(&self, flow: &mut Flow, suspended: SuspendedResources) -> Result<()> {
        let SuspendedResources { mut tx_object, suspended_transaction, synchronizations, name, read_only, isolation, was_active } =
            suspended;

        if let (Some(tx), Some(blob)) = (tx_object.as_mut(), suspended_transaction) {
            self.resource_manager.resume(flow, tx.as_mut(), blob)?;
        }

        if was_active {
            flow.set_tx_name(name);
            flow.set_read_only(read_only);
            flow.set_isolation(isolation);
            flow.set_actual_active(tx_object.is_some());
            flow.init_synchronization()?;
            if let Some(synchronizations) = synchronizations {
                for mut sync in synchronizations {
                    sync.resume();
                    flow.register_synchronization(sync)?;
                }
            }
        }

        Ok(())
    }

    /// Commits `status`, or rolls it back instead if it is (or has become)
    /// rollback-only, per the error-handling policy in §7.
    pub fn commit(&self, flow: &mut Flow, status: TransactionStatus) -> Result<()> {
        if status.is_completed() {
            return Err(CoordinatorError::already_completed());
        }

        if status.is_local_rollback_only() {
            tracing::debug!("scope is locally rollback-only; rolling back instead of committing");
            return self.process_rollback(flow, status);
        }

        if !self.resource_manager.should_commit_on_global_rollback_only() && status.is_global_rollback_only() {
            let name = status.name().map(String::from);
            let new_transaction = status.is_new_transaction();
            self.process_rollback(flow, status)?;
            if new_transaction || self.config.fail_early_on_global_rollback_only() {
                return Err(CoordinatorError::UnexpectedRollback { name });
            }
            return Ok(());
        }

        self.process_commit(flow, status)
    }

    fn process_commit(&self, flow: &mut Flow, mut status: TransactionStatus) -> Result<()> {
        tracing::debug!(name = status.name(), "committing transaction scope");
        self.resource_manager.prepare_for_commit(&mut status);
        flow.fire_before_commit(status.is_read_only())?;
        flow.fire_before_completion()?;

        let check_global_rollback_only =
            status.is_new_transaction() || self.config.fail_early_on_global_rollback_only();
        let was_global_rollback_only = check_global_rollback_only && status.is_global_rollback_only();

        let commit_result = if status.has_savepoint() {
            status.release_held_savepoint()
        } else if status.is_new_transaction() {
            self.resource_manager.commit(&mut status)
        } else {
            Ok(())
        };

        if let Err(err) = commit_result {
            return self.handle_commit_failure(flow, status, err);
        }

        if was_global_rollback_only {
            let name = status.name().map(String::from);
            flow.fire_after_completion(CompletionStatus::RolledBack);
            self.finish(flow, status);
            return Err(CoordinatorError::UnexpectedRollback { name });
        }

        let after_commit_result = flow.fire_after_commit();
        flow.fire_after_completion(CompletionStatus::Committed);
        self.finish(flow, status);
        after_commit_result
    }

    fn handle_commit_failure(&self, flow: &mut Flow, mut status: TransactionStatus, err: CoordinatorError) -> Result<()> {
        if matches!(err, CoordinatorError::UnexpectedRollback { .. }) {
            flow.fire_after_completion(CompletionStatus::RolledBack);
            self.finish(flow, status);
            return Err(err);
        }

        if self.config.rollback_on_commit_failure() {
            tracing::warn!(error = %err, "commit failed; driving a compensating rollback");
            if let Err(rollback_err) = self.resource_manager.rollback(&mut status) {
                tracing::warn!(error = %rollback_err, "compensating rollback after a failed commit also failed");
            }
            flow.fire_after_completion(CompletionStatus::RolledBack);
        } else {
            flow.fire_after_completion(CompletionStatus::Unknown);
        }
        self.finish(flow, status);
        Err(err)
    }

    /// Rolls `status` back unconditionally.
    pub fn rollback(&self, flow: &mut Flow, status: TransactionStatus) -> Result<()> {
        if status.is_completed() {
            return Err(CoordinatorError::already_completed());
        }
        self.process_rollback(flow, status)
    }

    fn process_rollback(&self, flow: &mut Flow, mut status: TransactionStatus) -> Result<()> {
        tracing::debug!(name = status.name(), "rolling back transaction scope");
        flow.fire_before_completion()?;

        let rollback_result = if status.has_savepoint() {
            status.rollback_to_held_savepoint()
        } else if status.is_new_transaction() {
            self.resource_manager.rollback(&mut status)
        } else if status.tx_object().is_some() {
            if status.is_local_rollback_only() || self.config.global_rollback_on_participation_failure() {
                self.resource_manager.set_rollback_only(&mut status)
            } else {
                tracing::debug!("participating scope failed; letting the owning scope decide");
                Ok(())
            }
        } else {
            Ok(())
        };

        match rollback_result {
            Ok(()) => {
                flow.fire_after_completion(CompletionStatus::RolledBack);
                self.finish(flow, status);
                Ok(())
            }
            Err(err) => {
                flow.fire_after_completion(CompletionStatus::Unknown);
                self.finish(flow, status);
                Err(err)
            }
        }
    }

    /// Common scope-exit bookkeeping shared by every commit/rollback path:
    /// resource-manager cleanup, resuming whatever was suspended, then marking
    /// `status` completed.
    fn finish(&self, flow: &mut Flow, mut status: TransactionStatus) {
        if status.is_new_transaction() {
            if let Some(tx_object) = status.tx_object_mut() {
                self.resource_manager.cleanup_after_completion(flow, tx_object);
            }
        }
        // This scope owned synchronization activation: tear down what `activate_synchronization`
        // set up so a sibling or later call on this flow doesn't inherit stale attributes.
        // Whatever gets resumed next (if anything) repopulates these from its own snapshot.
        if status.new_synchronization && flow.is_synchronization_active() {
            let _ = flow.clear_synchronization();
            flow.set_tx_name(None);
            flow.set_read_only(false);
            flow.set_isolation(None);
            flow.set_actual_active(false);
        }
        if let Some(suspended) = status.suspended_resources.take() {
            if let Err(err) = self.resume(flow, suspended) {
                tracing::error!(error = %err, "failed to resume a suspended scope after completion");
            }
        }
        status.mark_completed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;
    use crate::definition::{Definition, Isolation, Propagation};
    use crate::testing::{RecordingResourceManager, SpySynchronization, Trace};

    fn coordinator(manager: RecordingResourceManager) -> TransactionCoordinator {
        TransactionCoordinator::new(Arc::new(manager), CoordinatorConfig::default())
    }

    // §8 scenario 1: REQUIRED with no existing transaction starts one and commits it.
    #[test]
    fn required_with_no_existing_transaction_commits_a_new_one() {
        let trace = Trace::new();
        let manager = RecordingResourceManager::new(trace.clone());
        let coord = coordinator(manager);
        let mut flow = Flow::new();

        let def = Definition::builder().propagation(Propagation::Required).build();
        let status = coord.get_transaction(&mut flow, Some(&def)).unwrap();
        assert!(status.is_new_transaction());
        coord.commit(&mut flow, status).unwrap();

        assert_eq!(
            trace.events(),
            vec!["get_transaction", "begin", "prepare_for_commit", "commit", "cleanup_after_completion"]
        );
    }

    // §8 scenario 2: an inner REQUIRED participant marks itself rollback-only; the
    // outer transaction, which owns the physical transaction, rolls back and the
    // failure surfaces as UnexpectedRollback.
    #[test]
    fn participant_rollback_only_forces_outer_unexpected_rollback() {
        let trace = Trace::new();
        let manager = RecordingResourceManager::new(trace.clone());
        let coord = coordinator(manager);
        let mut flow = Flow::new();

        let required = Definition::builder().propagation(Propagation::Required).build();
        let outer = coord.get_transaction(&mut flow, Some(&required)).unwrap();
        assert!(outer.is_new_transaction());

        let mut inner = coord.get_transaction(&mut flow, Some(&required)).unwrap();
        assert!(!inner.is_new_transaction());
        inner.set_rollback_only();
        // A participant that marked itself rollback-only still calls `commit`, not
        // `rollback` directly — the coordinator transparently turns it into a rollback.
        coord.commit(&mut flow, inner).unwrap();

        let err = coord.commit(&mut flow, outer).unwrap_err();
        assert!(matches!(err, CoordinatorError::UnexpectedRollback { .. }));
        assert!(trace.events().contains(&"rollback".to_string()));
    }

    // §8 scenario 3: REQUIRES_NEW suspends the outer transaction, runs an
    // independent inner one, then resumes the outer transaction.
    #[test]
    fn requires_new_suspends_and_resumes_the_outer_transaction() {
        let trace = Trace::new();
        let manager = RecordingResourceManager::new(trace.clone());
        let coord = coordinator(manager);
        let mut flow = Flow::new();

        let required = Definition::builder().propagation(Propagation::Required).build();
        let outer = coord.get_transaction(&mut flow, Some(&required)).unwrap();

        let requires_new = Definition::builder().propagation(Propagation::RequiresNew).build();
        let inner = coord.get_transaction(&mut flow, Some(&requires_new)).unwrap();
        assert!(inner.is_new_transaction());
        coord.commit(&mut flow, inner).unwrap();

        coord.commit(&mut flow, outer).unwrap();

        let events = trace.events();
        let suspend_idx = events.iter().position(|e| e == "suspend").unwrap();
        let inner_begin_idx = events.iter().rposition(|e| e == "begin").unwrap();
        let resume_idx = events.iter().position(|e| e == "resume").unwrap();
        assert!(suspend_idx < inner_begin_idx);
        assert!(inner_begin_idx < resume_idx);
    }

    // §8 scenario 4: NESTED realized as a savepoint rolls back to the savepoint
    // without aborting the owning transaction.
    #[test]
    fn nested_rolls_back_to_a_savepoint_without_aborting_the_owner() {
        let trace = Trace::new();
        let manager = RecordingResourceManager::new(trace.clone());
        let coord = coordinator(manager);
        let mut flow = Flow::new();

        let required = Definition::builder().propagation(Propagation::Required).build();
        let outer = coord.get_transaction(&mut flow, Some(&required)).unwrap();

        let nested = Definition::builder().propagation(Propagation::Nested).build();
        let inner = coord.get_transaction(&mut flow, Some(&nested)).unwrap();
        assert!(inner.has_savepoint());
        coord.rollback(&mut flow, inner).unwrap();

        coord.commit(&mut flow, outer).unwrap();

        let events = trace.events();
        assert!(events.iter().any(|e| e.starts_with("savepoint_create")));
        assert!(events.iter().any(|e| e.starts_with("savepoint_rollback")));
        assert!(events.contains(&"commit".to_string()));
    }

    // §8 scenario 5: MANDATORY with no existing transaction fails fast.
    #[test]
    fn mandatory_without_existing_transaction_fails() {
        let trace = Trace::new();
        let manager = RecordingResourceManager::new(trace);
        let coord = coordinator(manager);
        let mut flow = Flow::new();

        let mandatory = Definition::builder().propagation(Propagation::Mandatory).build();
        let err = coord.get_transaction(&mut flow, Some(&mandatory)).unwrap_err();
        assert!(matches!(err, CoordinatorError::IllegalTransactionState(_)));
    }

    // §8 scenario 6: a commit failure with `rollback_on_commit_failure` enabled
    // drives a compensating physical rollback and still surfaces the original error.
    #[test]
    fn failed_commit_drives_compensating_rollback_when_configured() {
        let trace = Trace::new();
        let manager = RecordingResourceManager::new(trace.clone());
        manager.fail_next_commit();
        let config = CoordinatorConfig::builder().rollback_on_commit_failure(true).build().unwrap();
        let coord = TransactionCoordinator::new(Arc::new(manager), config);
        let mut flow = Flow::new();

        let required = Definition::builder().propagation(Propagation::Required).build();
        let status = coord.get_transaction(&mut flow, Some(&required)).unwrap();
        let err = coord.commit(&mut flow, status).unwrap_err();
        assert!(matches!(err, CoordinatorError::TransactionSystem { .. }));
        assert!(trace.events().contains(&"rollback".to_string()));
    }

    #[test]
    fn never_fails_when_a_transaction_is_already_active() {
        let trace = Trace::new();
        let manager = RecordingResourceManager::new(trace);
        let coord = coordinator(manager);
        let mut flow = Flow::new();

        let required = Definition::builder().propagation(Propagation::Required).build();
        let outer = coord.get_transaction(&mut flow, Some(&required)).unwrap();

        let never = Definition::builder().propagation(Propagation::Never).build();
        let err = coord.get_transaction(&mut flow, Some(&never)).unwrap_err();
        assert!(matches!(err, CoordinatorError::IllegalTransactionState(_)));

        coord.commit(&mut flow, outer).unwrap();
    }

    #[test]
    fn mandatory_joins_an_existing_transaction() {
        let trace = Trace::new();
        let manager = RecordingResourceManager::new(trace.clone());
        let coord = coordinator(manager);
        let mut flow = Flow::new();

        let required = Definition::builder().propagation(Propagation::Required).build();
        let outer = coord.get_transaction(&mut flow, Some(&required)).unwrap();

        let mandatory = Definition::builder().propagation(Propagation::Mandatory).build();
        let inner = coord.get_transaction(&mut flow, Some(&mandatory)).unwrap();
        assert!(!inner.is_new_transaction());
        coord.commit(&mut flow, inner).unwrap();
        coord.commit(&mut flow, outer).unwrap();

        assert_eq!(trace.events().iter().filter(|e| *e == "begin").count(), 1);
        assert_eq!(trace.events().iter().filter(|e| *e == "commit").count(), 1);
    }

    #[test]
    fn registry_is_restored_after_a_nested_scope_exits() {
        let trace = Trace::new();
        let manager = RecordingResourceManager::new(trace);
        let coord = coordinator(manager);
        let mut flow = Flow::new();

        let def = Definition::builder()
            .propagation(Propagation::Required)
            .isolation(Isolation::Serializable)
            .build();
        let outer = coord.get_transaction(&mut flow, Some(&def)).unwrap();
        assert_eq!(flow.isolation(), Some(Isolation::Serializable));

        let requires_new = Definition::builder().propagation(Propagation::RequiresNew).build();
        let inner = coord.get_transaction(&mut flow, Some(&requires_new)).unwrap();
        assert_eq!(flow.isolation(), None);
        coord.commit(&mut flow, inner).unwrap();

        assert_eq!(flow.isolation(), Some(Isolation::Serializable));
        coord.commit(&mut flow, outer).unwrap();
        assert_eq!(flow.isolation(), None);
    }

    // §8 scenario 6: a deadline that elapses before commit marks the underlying
    // transaction globally rollback-only, so `commit` rolls back instead of
    // committing and reports `UnexpectedRollback`. The definition itself defers
    // with `-1`, so this only passes if the coordinator actually resolves
    // `config.default_timeout_seconds` before calling `begin`.
    #[test]
    fn elapsed_timeout_forces_commit_into_rollback_with_unexpected_rollback() {
        let trace = Trace::new();
        let manager = RecordingResourceManager::new(trace.clone());
        let config = CoordinatorConfig::builder().default_timeout_seconds(0).build().unwrap();
        let coord = TransactionCoordinator::new(Arc::new(manager), config);
        let mut flow = Flow::new();

        let required = Definition::builder().propagation(Propagation::Required).build();
        assert_eq!(required.timeout_seconds(), -1);
        let status = coord.get_transaction(&mut flow, Some(&required)).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));

        let err = coord.commit(&mut flow, status).unwrap_err();
        assert!(matches!(err, CoordinatorError::UnexpectedRollback { .. }));
        assert!(trace.events().contains(&"rollback".to_string()));
        assert!(!trace.events().contains(&"commit".to_string()));
    }

    #[test]
    fn synchronizations_fire_in_stable_order_around_commit() {
        let trace = Trace::new();
        let manager = RecordingResourceManager::new(trace.clone());
        let coord = coordinator(manager);
        let mut flow = Flow::new();

        let def = Definition::builder().propagation(Propagation::Required).build();
        let status = coord.get_transaction(&mut flow, Some(&def)).unwrap();
        flow.register_synchronization(Box::new(SpySynchronization::with_order("b", trace.clone(), 2))).unwrap();
        flow.register_synchronization(Box::new(SpySynchronization::with_order("a", trace.clone(), 1))).unwrap();
        coord.commit(&mut flow, status).unwrap();

        let events = trace.events();
        let a_before = events.iter().position(|e| e == "a:before_commit").unwrap();
        let b_before = events.iter().position(|e| e == "b:before_commit").unwrap();
        assert!(a_before < b_before);
        assert!(events.contains(&"a:after_completion:Committed".to_string()));
        assert!(events.contains(&"b:after_completion:Committed".to_string()));
    }
}
