//! The synchronization bus (C2): an ordered set of lifecycle callbacks invoked
//! around commit/rollback boundaries.

use std::cmp::Ordering;

use crate::error::Result;

/// Outcome reported to [`Synchronization::after_completion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Committed,
    RolledBack,
    /// The coordinator could not determine whether the physical transaction
    /// committed or rolled back (e.g. a participant's own completion hook fired
    /// independently of this scope, or the resource manager's commit call failed
    /// in a way that leaves the outcome ambiguous).
    Unknown,
}

/// A callback bundle attached to a scope and fired at well-defined lifecycle
/// moments. Implementations that don't care about ordering relative to other
/// synchronizations can leave [`order`](Synchronization::order) at its default.
///
/// Error policy (§7): failures from [`before_commit`](Self::before_commit) and
/// [`before_completion`](Self::before_completion) propagate and cause a rollback;
/// failures from [`after_commit`](Self::after_commit) propagate but do not undo
/// the commit; failures from [`after_completion`](Self::after_completion) are
/// logged and swallowed by the coordinator.
pub trait Synchronization: Send {
    /// Called when the owning scope is suspended (§4.5d).
    fn suspend(&mut self) {}

    /// Called when the owning scope is resumed (§4.5d).
    fn resume(&mut self) {}

    /// Called to flush any buffered state to the resource before commit.
    fn flush(&mut self) {}

    /// Called before the physical commit, for every participant, even those that
    /// did not start the transaction. `read_only` reflects the definition's hint.
    fn before_commit(&mut self, _read_only: bool) -> Result<()> {
        Ok(())
    }

    /// Called immediately before completion (commit or rollback) actually happens.
    fn before_completion(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called after a successful physical commit, before `after_completion`.
    fn after_commit(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called exactly once per scope, regardless of outcome, after completion.
    fn after_completion(&mut self, _status: CompletionStatus) -> Result<()> {
        Ok(())
    }

    /// Relative firing order among synchronizations registered on the same flow.
    /// Lower values fire first; `None` sorts after every `Some` value and compares
    /// equal to other `None`s, so unordered registrations keep insertion order
    /// under a stable sort.
    fn order(&self) -> Option<i32> {
        None
    }
}

/// Stable-sorts a snapshot of synchronizations by [`Synchronization::order`],
/// treating `None` as "no preference" (sorts after any `Some`, ties break by
/// original position because the sort is stable).
pub(crate) fn sort_by_order<T: Synchronization + ?Sized>(items: &mut [Box<T>]) {
    items.sort_by(|a, b| match (a.order(), b.order()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(Option<i32>);
    impl Synchronization for Noop {
        fn order(&self) -> Option<i32> {
            self.0
        }
    }

    #[test]
    fn sort_is_stable_and_puts_none_last() {
        let mut items: Vec<Box<dyn Synchronization>> = vec![
            Box::new(Noop(None)),
            Box::new(Noop(Some(5))),
            Box::new(Noop(None)),
            Box::new(Noop(Some(1))),
            Box::new(Noop(Some(5))),
        ];
        sort_by_order(&mut items);
        let orders: Vec<Option<i32>> = items.iter().map(|s| s.order()).collect();
        assert_eq!(orders, vec![Some(1), Some(5), Some(5), None, None]);
    }
}
