//! Process-wide admission control for streaming sessions.
//!
//! The budget is a hard cap, not a scheduler: a denied request is reported
//! straight back to the card and never queued.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counter of live streaming sessions, bounded by `max`.
///
/// Construct one per process (or per test) and inject it as an
/// `Arc<SessionBudget>`; cards never touch the counter directly.
#[derive(Debug)]
pub struct SessionBudget {
    active: AtomicUsize,
    max: usize,
}

impl SessionBudget {
    pub fn new(max: usize) -> Arc<Self> {
        Arc::new(Self {
            active: AtomicUsize::new(0),
            max,
        })
    }

    /// Admit one session if a slot is free.
    ///
    /// The returned permit gives the slot back when dropped.
    pub fn try_acquire(self: &Arc<Self>) -> Option<BudgetPermit> {
        let admitted = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < self.max).then_some(active + 1)
            });

        match admitted {
            Ok(previous) => {
                tracing::debug!(active = previous + 1, max = self.max, "Session admitted");
                Some(BudgetPermit {
                    budget: Arc::clone(self),
                })
            }
            Err(active) => {
                tracing::debug!(active, max = self.max, "Session denied, budget exhausted");
                None
            }
        }
    }

    /// Give one slot back, never going below zero.
    ///
    /// Permits call this on drop; calling it by hand is only needed for
    /// slots obtained outside [`BudgetPermit`].
    pub fn release(&self) {
        let released = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                active.checked_sub(1)
            });

        match released {
            Ok(previous) => {
                tracing::debug!(active = previous - 1, max = self.max, "Session released");
            }
            Err(_) => {
                tracing::warn!("Session budget released while already empty; ignoring");
            }
        }
    }

    /// Number of sessions currently holding a slot.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn available(&self) -> usize {
        self.max.saturating_sub(self.active())
    }
}

/// One admitted slot in a [`SessionBudget`].
#[must_use = "dropping a permit releases its slot immediately"]
pub struct BudgetPermit {
    budget: Arc<SessionBudget>,
}

impl BudgetPermit {
    /// Release the slot now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for BudgetPermit {
    fn drop(&mut self) {
        self.budget.release();
    }
}

impl fmt::Debug for BudgetPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BudgetPermit")
            .field("active", &self.budget.active())
            .field("max", &self.budget.max())
            .finish()
    }
}
