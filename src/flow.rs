//! Flow-local registry (C1): per-logical-flow storage for bound resources, the
//! active synchronization set, and active-transaction attributes.
//!
//! A "flow" is the unit along which transactional context propagates. Rather than
//! binding this state to OS-thread-local storage (as a thread-per-request host
//! would), this crate represents a flow as an explicit, caller-owned [`Flow`] value
//! threaded through every [`crate::coordinator::TransactionCoordinator`] call (see
//! the Design Notes in `SPEC_FULL.md`). This keeps the coordinator free of global
//! mutable state and lets tests run many independent flows without synchronization.

use std::any::Any;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use uuid::Uuid;

use crate::definition::Isolation;
use crate::error::{CoordinatorError, Result};
use crate::synchronization::{sort_by_order, CompletionStatus, Synchronization};

/// A key under which a resource is bound in a [`Flow`]. Keys compare and hash by
/// the identity of the wrapped value (pointer equality on the shared allocation),
/// matching the "compared by identity" contract — two keys wrapping
/// `Arc`-equal-but-distinct-allocation values are *not* the same key.
#[derive(Clone)]
pub struct ResourceKey(Arc<dyn Any + Send + Sync>);

impl ResourceKey {
    pub fn new(value: Arc<dyn Any + Send + Sync>) -> Self {
        Self(value)
    }

    pub fn from_value<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl PartialEq for ResourceKey {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}
impl Eq for ResourceKey {}

impl Hash for ResourceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl std::fmt::Debug for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResourceKey({:#x})", self.identity())
    }
}

/// A value a resource manager binds into the registry. Most implementations wrap
/// [`crate::holder::ResourceHolderSupport`] via [`crate::holder::ManagedResource`].
pub trait BoundResource: Any + Send {
    /// See [`crate::holder::ResourceHolderSupport::is_void`]. A voided holder is
    /// treated as absent by [`Flow::get_resource`] and evicted lazily.
    fn is_void(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

type UnwrapHook = Arc<dyn Fn(&ResourceKey) -> ResourceKey + Send + Sync>;

/// Per-flow transactional state: bound resources, the active synchronization set
/// (if any), and the attributes of whatever transaction is currently active.
pub struct Flow {
    id: Uuid,
    resources: HashMap<usize, (ResourceKey, Box<dyn BoundResource>)>,
    synchronizations: Option<Vec<Box<dyn Synchronization>>>,
    tx_name: Option<String>,
    read_only: bool,
    isolation: Option<Isolation>,
    actual_active: bool,
    unwrap_hook: Option<UnwrapHook>,
}

impl Default for Flow {
    fn default() -> Self {
        Self::new()
    }
}

impl Flow {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            resources: HashMap::new(),
            synchronizations: None,
            tx_name: None,
            read_only: false,
            isolation: None,
            actual_active: false,
            unwrap_hook: None,
        }
    }

    /// A stable identifier for this flow, used to correlate log lines across
    /// suspend/resume boundaries (§4.10 diagnostics).
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Installs a hook letting proxy wrappers expose their underlying factory as
    /// the effective lookup key, e.g. `|k| k.downcast_ref::<Proxy>().map(Proxy::target).unwrap_or_else(|| k.clone())`.
    pub fn set_unwrap_hook(&mut self, hook: impl Fn(&ResourceKey) -> ResourceKey + Send + Sync + 'static) {
        self.unwrap_hook = Some(Arc::new(hook));
    }

    fn resolve(&self, key: &ResourceKey) -> ResourceKey {
        match &self.unwrap_hook {
            Some(hook) => hook(key),
            None => key.clone(),
        }
    }

    pub fn has_resource(&self, key: &ResourceKey) -> bool {
        let key = self.resolve(key);
        matches!(self.resources.get(&key.identity()), Some((_, holder)) if !holder.is_void())
    }

    /// Looks up a bound resource, lazily evicting it first if its `void` flag is set.
    pub fn get_resource(&mut self, key: &ResourceKey) -> Option<&mut dyn BoundResource> {
        let key = self.resolve(key);
        let identity = key.identity();
        if matches!(self.resources.get(&identity), Some((_, holder)) if holder.is_void()) {
            self.resources.remove(&identity);
            return None;
        }
        self.resources.get_mut(&identity).map(|(_, holder)| holder.as_mut())
    }

    pub fn bind_resource(&mut self, key: ResourceKey, value: Box<dyn BoundResource>) -> Result<()> {
        let resolved = self.resolve(&key);
        let identity = resolved.identity();
        if self.resources.contains_key(&identity) {
            return Err(CoordinatorError::already_bound());
        }
        self.resources.insert(identity, (resolved, value));
        Ok(())
    }

    pub fn unbind_resource(&mut self, key: &ResourceKey) -> Result<Box<dyn BoundResource>> {
        let key = self.resolve(key);
        self.resources
            .remove(&key.identity())
            .map(|(_, holder)| holder)
            .ok_or_else(CoordinatorError::not_bound)
    }

    pub fn unbind_resource_if_possible(&mut self, key: &ResourceKey) -> Option<Box<dyn BoundResource>> {
        let key = self.resolve(key);
        self.resources.remove(&key.identity()).map(|(_, holder)| holder)
    }

    pub fn tx_name(&self) -> Option<&str> {
        self.tx_name.as_deref()
    }

    pub fn set_tx_name(&mut self, name: Option<String>) {
        self.tx_name = name;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn isolation(&self) -> Option<Isolation> {
        self.isolation
    }

    pub fn set_isolation(&mut self, isolation: Option<Isolation>) {
        self.isolation = isolation;
    }

    pub fn is_actual_active(&self) -> bool {
        self.actual_active
    }

    pub fn set_actual_active(&mut self, active: bool) {
        self.actual_active = active;
    }

    pub fn is_synchronization_active(&self) -> bool {
        self.synchronizations.is_some()
    }

    pub fn init_synchronization(&mut self) -> Result<()> {
        if self.synchronizations.is_some() {
            return Err(CoordinatorError::synchronization_already_active());
        }
        self.synchronizations = Some(Vec::new());
        Ok(())
    }

    pub fn clear_synchronization(&mut self) -> Result<Vec<Box<dyn Synchronization>>> {
        self.synchronizations
            .take()
            .ok_or_else(CoordinatorError::synchronization_not_active)
    }

    /// Registers a synchronization; fails if synchronization is not active for this
    /// flow (C2 contract).
    pub fn register_synchronization(&mut self, sync: Box<dyn Synchronization>) -> Result<()> {
        match &mut self.synchronizations {
            Some(syncs) => {
                syncs.push(sync);
                Ok(())
            }
            None => Err(CoordinatorError::synchronization_not_active()),
        }
    }

    /// Resets synchronization and every per-flow attribute to its default.
    pub fn clear(&mut self) {
        self.synchronizations = None;
        self.tx_name = None;
        self.read_only = false;
        self.isolation = None;
        self.actual_active = false;
    }

    fn with_sorted_synchronizations(&mut self, mut f: impl FnMut(&mut Box<dyn Synchronization>)) {
        if let Some(syncs) = &mut self.synchronizations {
            sort_by_order(syncs);
            for sync in syncs.iter_mut() {
                f(sync);
            }
        }
    }

    pub(crate) fn fire_suspend(&mut self) {
        self.with_sorted_synchronizations(|s| s.suspend());
    }

    pub(crate) fn fire_resume(&mut self) {
        self.with_sorted_synchronizations(|s| s.resume());
    }

    pub(crate) fn fire_flush(&mut self) {
        self.with_sorted_synchronizations(|s| s.flush());
    }

    /// Fires `before_commit` on every synchronization in order, stopping at (and
    /// returning) the first failure — a failed pre-commit hook must prevent the
    /// physical commit from running at all.
    pub(crate) fn fire_before_commit(&mut self, read_only: bool) -> Result<()> {
        if let Some(syncs) = &mut self.synchronizations {
            sort_by_order(syncs);
            for sync in syncs.iter_mut() {
                sync.before_commit(read_only)?;
            }
        }
        Ok(())
    }

    /// Fires `before_completion` on every synchronization in order, stopping at the
    /// first failure, same rationale as [`Self::fire_before_commit`].
    pub(crate) fn fire_before_completion(&mut self) -> Result<()> {
        if let Some(syncs) = &mut self.synchronizations {
            sort_by_order(syncs);
            for sync in syncs.iter_mut() {
                sync.before_completion()?;
            }
        }
        Ok(())
    }

    /// Fires `after_commit` on every synchronization, running all of them even if
    /// one fails, then returns the first error encountered (the commit already
    /// happened, so this cannot undo it — it only surfaces the failure).
    pub(crate) fn fire_after_commit(&mut self) -> Result<()> {
        let mut first_error = None;
        if let Some(syncs) = &mut self.synchronizations {
            sort_by_order(syncs);
            for sync in syncs.iter_mut() {
                if let Err(err) = sync.after_commit() {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Fires `after_completion` on every synchronization, logging and swallowing any
    /// failure: by the time this runs, the transaction has already committed or
    /// rolled back and there is nothing left to roll back further.
    pub(crate) fn fire_after_completion(&mut self, status: CompletionStatus) {
        if let Some(syncs) = &mut self.synchronizations {
            sort_by_order(syncs);
            for sync in syncs.iter_mut() {
                if let Err(err) = sync.after_completion(status) {
                    tracing::warn!(error = %err, "synchronization after_completion failed; ignoring");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holder::{ManagedResource, ResourceHolderSupport};

    fn key() -> ResourceKey {
        ResourceKey::from_value("factory-a")
    }

    #[test]
    fn binding_same_key_twice_fails() {
        let mut flow = Flow::new();
        let k = key();
        let v1: Box<dyn BoundResource> =
            Box::new(ManagedResource::new(1u32, ResourceHolderSupport::new()));
        let v2: Box<dyn BoundResource> =
            Box::new(ManagedResource::new(2u32, ResourceHolderSupport::new()));
        flow.bind_resource(k.clone(), v1).unwrap();
        let err = flow.bind_resource(k, v2).unwrap_err();
        assert!(matches!(err, CoordinatorError::IllegalTransactionState(_)));
    }

    #[test]
    fn unbinding_absent_key_fails() {
        let mut flow = Flow::new();
        assert!(flow.unbind_resource(&key()).is_err());
        assert!(flow.unbind_resource_if_possible(&key()).is_none());
    }

    #[test]
    fn distinct_keys_with_equal_wrapped_values_are_not_equal() {
        let mut flow = Flow::new();
        let k1 = ResourceKey::from_value("same-name");
        let k2 = ResourceKey::from_value("same-name");
        let v: Box<dyn BoundResource> =
            Box::new(ManagedResource::new(1u32, ResourceHolderSupport::new()));
        flow.bind_resource(k1, v).unwrap();
        assert!(!flow.has_resource(&k2));
    }

    #[test]
    fn void_holder_is_evicted_lazily_on_lookup() {
        let mut flow = Flow::new();
        let k = key();
        let mut support = ResourceHolderSupport::new();
        support.unbound();
        let v: Box<dyn BoundResource> = Box::new(ManagedResource::new(1u32, support));
        flow.bind_resource(k.clone(), v).unwrap();
        assert!(!flow.has_resource(&k));
        assert!(flow.get_resource(&k).is_none());
        assert!(flow.unbind_resource_if_possible(&k).is_none());
    }

    #[test]
    fn synchronization_lifecycle_requires_init_before_register() {
        let mut flow = Flow::new();
        assert!(!flow.is_synchronization_active());
        let err = flow.clear_synchronization().unwrap_err();
        assert!(matches!(err, CoordinatorError::IllegalTransactionState(_)));

        flow.init_synchronization().unwrap();
        assert!(flow.is_synchronization_active());
        assert!(flow.init_synchronization().is_err());

        let drained = flow.clear_synchronization().unwrap();
        assert!(drained.is_empty());
        assert!(!flow.is_synchronization_active());
    }

    #[test]
    fn clear_resets_attributes_but_not_resources() {
        let mut flow = Flow::new();
        flow.set_tx_name(Some("tx-1".to_string()));
        flow.set_read_only(true);
        flow.set_isolation(Some(Isolation::Serializable));
        flow.set_actual_active(true);
        flow.init_synchronization().unwrap();

        let k = key();
        let v: Box<dyn BoundResource> =
            Box::new(ManagedResource::new(1u32, ResourceHolderSupport::new()));
        flow.bind_resource(k.clone(), v).unwrap();

        flow.clear();

        assert_eq!(flow.tx_name(), None);
        assert!(!flow.is_read_only());
        assert_eq!(flow.isolation(), None);
        assert!(!flow.is_actual_active());
        assert!(!flow.is_synchronization_active());
        assert!(flow.has_resource(&k));
    }
}
