//! In-memory test harness (C12): a [`crate::manager::ResourceManager`] that
//! records every hook invocation instead of talking to a real resource, so
//! propagation and commit/rollback workflows can be exercised without a database.
//!
//! Available to this crate's own test suite unconditionally, and to downstream
//! crates behind the `test-support` feature.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::definition::Definition;
use crate::error::{CoordinatorError, Result, SimpleResourceError};
use crate::flow::Flow;
use crate::manager::{ResourceManager, TransactionObject};
use crate::savepoint::{Savepoint, SavepointManager};
use crate::status::TransactionStatus;
use crate::synchronization::{CompletionStatus, Synchronization};

/// A shared, growable log of hook invocations in the order they fired. Cloning is
/// cheap; every clone observes the same underlying log.
#[derive(Clone, Default)]
pub struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    /// A snapshot of every event recorded so far, in order.
    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

#[derive(Debug, Default)]
struct ConnectionState {
    name: Option<String>,
    rollback_only: bool,
    savepoints: Vec<u64>,
    next_savepoint: u64,
    /// Armed by `begin` from the (possibly coordinator-resolved) definition
    /// timeout; checked lazily by `is_global_rollback_only`, mirroring
    /// `ResourceHolderSupport::time_to_live_millis`'s lazy-expiry behavior.
    deadline: Option<Instant>,
}

#[derive(Clone, Default)]
struct Shared(Arc<Mutex<Option<ConnectionState>>>);

/// A minimal transaction object over an in-memory "connection". Implements
/// [`SavepointManager`] on itself so [`RecordingResourceManager`] can exercise
/// `NESTED` propagation without a second type.
pub struct InMemoryTransactionObject {
    shared: Shared,
    trace: Trace,
    existing: bool,
    supports_savepoints: bool,
}

impl InMemoryTransactionObject {
    /// Builds a standalone object with no backing resource manager, useful for unit
    /// tests of [`crate::status::TransactionStatus`] that don't need a coordinator.
    pub fn new(name: impl Into<String>) -> Self {
        let shared = Shared::default();
        *shared.0.lock() = Some(ConnectionState {
            name: Some(name.into()),
            ..ConnectionState::default()
        });
        Self {
            shared,
            trace: Trace::new(),
            existing: false,
            supports_savepoints: true,
        }
    }
}

impl TransactionObject for InMemoryTransactionObject {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn is_global_rollback_only(&self) -> bool {
        let mut guard = self.shared.0.lock();
        let Some(state) = guard.as_mut() else {
            return false;
        };
        if !state.rollback_only {
            if let Some(deadline) = state.deadline {
                if Instant::now() >= deadline {
                    state.rollback_only = true;
                }
            }
        }
        state.rollback_only
    }

    fn as_savepoint_manager(&mut self) -> Option<&mut dyn SavepointManager> {
        let has_connection = self.shared.0.lock().is_some();
        if self.supports_savepoints && has_connection {
            Some(self)
        } else {
            None
        }
    }
}

impl SavepointManager for InMemoryTransactionObject {
    fn create_savepoint(&mut self) -> Result<Savepoint> {
        let mut guard = self.shared.0.lock();
        let state = guard
            .as_mut()
            .ok_or_else(|| CoordinatorError::IllegalTransactionState("no active connection".to_string()))?;
        let id = state.next_savepoint;
        state.next_savepoint += 1;
        state.savepoints.push(id);
        self.trace.record(format!("savepoint_create:{id}"));
        Ok(Box::new(id))
    }

    fn rollback_to_savepoint(&mut self, savepoint: Savepoint) -> Result<()> {
        let id = *savepoint
            .downcast::<u64>()
            .map_err(|_| CoordinatorError::IllegalTransactionState("foreign savepoint handle".to_string()))?;
        let mut guard = self.shared.0.lock();
        let state = guard
            .as_mut()
            .ok_or_else(|| CoordinatorError::IllegalTransactionState("no active connection".to_string()))?;
        let position = state
            .savepoints
            .iter()
            .position(|&s| s == id)
            .ok_or_else(|| CoordinatorError::IllegalTransactionState("unknown savepoint".to_string()))?;
        state.savepoints.truncate(position + 1);
        self.trace.record(format!("savepoint_rollback:{id}"));
        Ok(())
    }

    fn release_savepoint(&mut self, savepoint: Savepoint) -> Result<()> {
        let id = *savepoint
            .downcast::<u64>()
            .map_err(|_| CoordinatorError::IllegalTransactionState("foreign savepoint handle".to_string()))?;
        let mut guard = self.shared.0.lock();
        let state = guard
            .as_mut()
            .ok_or_else(|| CoordinatorError::IllegalTransactionState("no active connection".to_string()))?;
        state.savepoints.retain(|&s| s != id);
        self.trace.record(format!("savepoint_release:{id}"));
        Ok(())
    }
}

/// A [`ResourceManager`] backed by an in-memory "connection" instead of a real
/// database handle, recording every hook call into a shared [`Trace`] in firing
/// order. Failure injection lets tests drive the coordinator's error-handling
/// branches deterministically.
#[derive(Clone)]
pub struct RecordingResourceManager {
    shared: Shared,
    trace: Trace,
    supports_suspend: bool,
    supports_savepoints: bool,
    fail_begin_once: Arc<Mutex<bool>>,
    fail_commit_once: Arc<Mutex<bool>>,
}

impl RecordingResourceManager {
    pub fn new(trace: Trace) -> Self {
        Self {
            shared: Shared::default(),
            trace,
            supports_suspend: true,
            supports_savepoints: true,
            fail_begin_once: Arc::new(Mutex::new(false)),
            fail_commit_once: Arc::new(Mutex::new(false)),
        }
    }

    pub fn without_suspend_support(mut self) -> Self {
        self.supports_suspend = false;
        self
    }

    pub fn without_savepoint_support(mut self) -> Self {
        self.supports_savepoints = false;
        self
    }

    /// The next call to `begin` fails with a [`SimpleResourceError`].
    pub fn fail_next_begin(&self) {
        *self.fail_begin_once.lock() = true;
    }

    /// The next call to `commit` fails with a [`SimpleResourceError`].
    pub fn fail_next_commit(&self) {
        *self.fail_commit_once.lock() = true;
    }

    fn take_flag(flag: &Mutex<bool>) -> bool {
        let mut guard = flag.lock();
        std::mem::replace(&mut *guard, false)
    }
}

impl ResourceManager for RecordingResourceManager {
    fn get_transaction(&self, _flow: &mut Flow) -> Result<Box<dyn TransactionObject>> {
        self.trace.record("get_transaction");
        let existing = self.shared.0.lock().is_some();
        Ok(Box::new(InMemoryTransactionObject {
            shared: self.shared.clone(),
            trace: self.trace.clone(),
            existing,
            supports_savepoints: self.supports_savepoints,
        }))
    }

    fn begin(&self, tx_object: &mut dyn TransactionObject, definition: &Definition) -> Result<()> {
        self.trace.record("begin");
        if Self::take_flag(&self.fail_begin_once) {
            return Err(CoordinatorError::resource_manager(
                "begin",
                SimpleResourceError::new("injected begin failure"),
            ));
        }
        let object = tx_object
            .as_any_mut()
            .downcast_mut::<InMemoryTransactionObject>()
            .expect("RecordingResourceManager always produces InMemoryTransactionObject");
        let deadline = match definition.timeout_seconds() {
            secs if secs >= 0 => Some(Instant::now() + Duration::from_secs(secs as u64)),
            _ => None,
        };
        *object.shared.0.lock() = Some(ConnectionState {
            name: definition.name().map(String::from),
            deadline,
            ..ConnectionState::default()
        });
        object.existing = true;
        Ok(())
    }

    fn commit(&self, status: &mut TransactionStatus) -> Result<()> {
        self.trace.record("commit");
        if Self::take_flag(&self.fail_commit_once) {
            return Err(CoordinatorError::resource_manager(
                "commit",
                SimpleResourceError::new("injected commit failure"),
            ));
        }
        *self.shared.0.lock() = None;
        let _ = status;
        Ok(())
    }

    fn rollback(&self, status: &mut TransactionStatus) -> Result<()> {
        self.trace.record("rollback");
        *self.shared.0.lock() = None;
        let _ = status;
        Ok(())
    }

    fn is_existing_transaction(&self, tx_object: &dyn TransactionObject) -> bool {
        tx_object
            .as_any()
            .downcast_ref::<InMemoryTransactionObject>()
            .map(|o| o.existing)
            .unwrap_or(false)
    }

    fn use_savepoint_for_nested_transaction(&self) -> bool {
        true
    }

    fn suspend(&self, _flow: &mut Flow, _tx_object: &mut dyn TransactionObject) -> Result<Box<dyn Any + Send>> {
        if !self.supports_suspend {
            return Err(CoordinatorError::TransactionSuspensionNotSupported);
        }
        self.trace.record("suspend");
        let state = self.shared.0.lock().take();
        Ok(Box::new(state))
    }

    fn resume(
        &self,
        _flow: &mut Flow,
        _tx_object: &mut dyn TransactionObject,
        suspended: Box<dyn Any + Send>,
    ) -> Result<()> {
        self.trace.record("resume");
        let state = *suspended
            .downcast::<Option<ConnectionState>>()
            .map_err(|_| CoordinatorError::IllegalTransactionState("foreign suspended handle".to_string()))?;
        *self.shared.0.lock() = state;
        Ok(())
    }

    fn set_rollback_only(&self, _status: &mut TransactionStatus) -> Result<()> {
        self.trace.record("set_rollback_only");
        let mut guard = self.shared.0.lock();
        match guard.as_mut() {
            Some(state) => {
                state.rollback_only = true;
                Ok(())
            }
            None => Err(CoordinatorError::IllegalTransactionState(
                "no active connection to mark rollback-only".to_string(),
            )),
        }
    }

    fn should_commit_on_global_rollback_only(&self) -> bool {
        false
    }

    fn prepare_for_commit(&self, _status: &mut TransactionStatus) {
        self.trace.record("prepare_for_commit");
    }

    fn cleanup_after_completion(&self, _flow: &mut Flow, _tx_object: &mut dyn TransactionObject) {
        self.trace.record("cleanup_after_completion");
    }
}

/// A [`Synchronization`] spy that records every lifecycle call it receives,
/// labelled so tests can tell apart synchronizations registered by different
/// scopes.
pub struct SpySynchronization {
    label: &'static str,
    trace: Trace,
    order: Option<i32>,
}

impl SpySynchronization {
    pub fn new(label: &'static str, trace: Trace) -> Self {
        Self { label, trace, order: None }
    }

    pub fn with_order(label: &'static str, trace: Trace, order: i32) -> Self {
        Self { label, trace, order: Some(order) }
    }
}

impl Synchronization for SpySynchronization {
    fn suspend(&mut self) {
        self.trace.record(format!("{}:suspend", self.label));
    }

    fn resume(&mut self) {
        self.trace.record(format!("{}:resume", self.label));
    }

    fn flush(&mut self) {
        self.trace.record(format!("{}:flush", self.label));
    }

    fn before_commit(&mut self, _read_only: bool) -> Result<()> {
        self.trace.record(format!("{}:before_commit", self.label));
        Ok(())
    }

    fn before_completion(&mut self) -> Result<()> {
        self.trace.record(format!("{}:before_completion", self.label));
        Ok(())
    }

    fn after_commit(&mut self) -> Result<()> {
        self.trace.record(format!("{}:after_commit", self.label));
        Ok(())
    }

    fn after_completion(&mut self, status: CompletionStatus) -> Result<()> {
        self.trace.record(format!("{}:after_completion:{status:?}", self.label));
        Ok(())
    }

    fn order(&self) -> Option<i32> {
        self.order
    }
}
