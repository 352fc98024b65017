//! Resource-holder base (C3): a reference-counted, timeout-aware wrapper around an
//! acquired resource, with a local rollback-only flag.

use std::any::Any;
use std::time::{Duration, Instant};

use crate::error::{CoordinatorError, Result};
use crate::flow::BoundResource;

/// Common state every resource holder bound into the flow-local registry carries,
/// regardless of what concrete resource it wraps.
///
/// Resource-manager implementations embed this as a field (composition, not
/// inheritance) in whatever holder type they bind under [`crate::flow::Flow`].
#[derive(Debug, Default)]
pub struct ResourceHolderSupport {
    synchronized_with_transaction: bool,
    rollback_only: bool,
    deadline: Option<Instant>,
    ref_count: usize,
    /// Set by [`ResourceHolderSupport::unbound`]; a voided holder behaves as absent
    /// on lookup and is lazily evicted by [`crate::flow::Flow::get_resource`].
    void: bool,
}

impl ResourceHolderSupport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_synchronized_with_transaction(&self) -> bool {
        self.synchronized_with_transaction
    }

    pub fn set_synchronized_with_transaction(&mut self, synchronized: bool) {
        self.synchronized_with_transaction = synchronized;
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub fn set_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    pub fn reset_rollback_only(&mut self) {
        self.rollback_only = false;
    }

    /// Arms the holder's deadline `timeout` from now.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.deadline = Some(Instant::now() + timeout);
    }

    /// Arms the holder's deadline at an absolute instant (used when propagating a
    /// deadline computed elsewhere, e.g. from an outer transaction's definition).
    pub fn set_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    pub fn has_timeout(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Milliseconds remaining before the deadline. Marks the holder rollback-only
    /// and fails with [`CoordinatorError::TransactionTimedOut`] if the deadline has
    /// already passed (or there is no timeout armed and the caller still asked).
    pub fn time_to_live_millis(&mut self) -> Result<u64> {
        let deadline = self.deadline.ok_or_else(|| {
            CoordinatorError::IllegalTransactionState(
                "no timeout has been set on this resource holder".to_string(),
            )
        })?;
        let now = Instant::now();
        if deadline <= now {
            self.rollback_only = true;
            return Err(CoordinatorError::TransactionTimedOut);
        }
        Ok((deadline - now).as_millis() as u64)
    }

    /// Seconds remaining before the deadline, rounded *up* to the next whole second.
    pub fn time_to_live_seconds(&mut self) -> Result<u64> {
        let millis = self.time_to_live_millis()?;
        Ok(millis.div_ceil(1000))
    }

    pub fn requested(&mut self) {
        self.ref_count += 1;
    }

    pub fn released(&mut self) {
        self.ref_count = self.ref_count.saturating_sub(1);
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    pub fn is_open(&self) -> bool {
        self.ref_count > 0
    }

    /// Zeroes transactional state but preserves the reference count.
    pub fn clear(&mut self) {
        self.synchronized_with_transaction = false;
        self.rollback_only = false;
        self.deadline = None;
    }

    /// Like [`clear`](Self::clear) but also zeroes the reference count.
    pub fn reset(&mut self) {
        self.clear();
        self.ref_count = 0;
    }

    /// Marks the holder void: future registry lookups treat it as absent and evict
    /// it lazily.
    pub fn unbound(&mut self) {
        self.void = true;
    }

    pub fn is_void(&self) -> bool {
        self.void
    }
}

/// Pairs a resource manager's own resource value with the [`ResourceHolderSupport`]
/// state the registry needs, and implements [`BoundResource`] by forwarding to it.
/// This is the composition-over-inheritance shape the spec's C3 design note calls
/// for: a resource manager wraps its connection/cursor/handle in `ManagedResource`
/// rather than subclassing a holder base class.
#[derive(Debug)]
pub struct ManagedResource<T> {
    pub value: T,
    pub support: ResourceHolderSupport,
}

impl<T> ManagedResource<T> {
    pub fn new(value: T, support: ResourceHolderSupport) -> Self {
        Self { value, support }
    }
}

impl<T: Any + Send> BoundResource for ManagedResource<T> {
    fn is_void(&self) -> bool {
        self.support.is_void()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn ref_counting_tracks_open_state() {
        let mut holder = ResourceHolderSupport::new();
        assert!(!holder.is_open());
        holder.requested();
        holder.requested();
        assert!(holder.is_open());
        holder.released();
        assert!(holder.is_open());
        holder.released();
        assert!(!holder.is_open());
    }

    #[test]
    fn released_never_underflows() {
        let mut holder = ResourceHolderSupport::new();
        holder.released();
        holder.released();
        assert_eq!(holder.ref_count(), 0);
    }

    #[test]
    fn clear_preserves_ref_count_reset_does_not() {
        let mut holder = ResourceHolderSupport::new();
        holder.requested();
        holder.set_rollback_only();
        holder.clear();
        assert!(!holder.is_rollback_only());
        assert_eq!(holder.ref_count(), 1);
        holder.reset();
        assert_eq!(holder.ref_count(), 0);
    }

    #[test]
    fn unbound_marks_void() {
        let mut holder = ResourceHolderSupport::new();
        assert!(!holder.is_void());
        holder.unbound();
        assert!(holder.is_void());
    }

    #[test]
    fn time_to_live_rounds_up_to_whole_seconds() {
        let mut holder = ResourceHolderSupport::new();
        holder.set_timeout(Duration::from_millis(1500));
        let secs = holder.time_to_live_seconds().unwrap();
        assert_eq!(secs, 2);
    }

    #[test]
    fn elapsed_deadline_forces_rollback_only_and_times_out() {
        let mut holder = ResourceHolderSupport::new();
        holder.set_timeout(Duration::from_millis(10));
        sleep(Duration::from_millis(30));
        let err = holder.time_to_live_millis().unwrap_err();
        assert!(matches!(err, CoordinatorError::TransactionTimedOut));
        assert!(holder.is_rollback_only());
    }
}
