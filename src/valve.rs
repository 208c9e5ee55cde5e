//! Pressure relief valve
//!
//! An adaptive admission gate. While fewer than `threshold` items are inside,
//! items are admitted straight away. Beyond that, each item must pass a
//! caller-supplied wait predicate (typically host politeness) within a
//! randomized timeout, or it is turned away.
//!
//! The threshold is not a hard cap: items that pass the predicate are admitted
//! even above it. Total concurrency is bounded elsewhere.

use crate::jitter::Jitter;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Decides whether an item may enter once the valve is under pressure
#[async_trait]
pub trait WaitPredicate<T>: Send + Sync {
    /// Waits up to `timeout` for `item` to become admissible
    ///
    /// Returns `true` to admit the item, `false` to reject it.
    async fn wait(&self, item: &T, timeout: Duration) -> bool;
}

/// Adaptive admission gate over items of type `T`
pub struct PressureReliefValve<T> {
    in_valve: AtomicUsize,
    threshold: usize,
    base_wait: Duration,
    jitter: Jitter,
    predicate: Arc<dyn WaitPredicate<T>>,
}

impl<T> PressureReliefValve<T> {
    /// Creates a valve
    ///
    /// # Arguments
    ///
    /// * `threshold` - Number of items admitted before the predicate is consulted
    /// * `base_wait` - Base predicate timeout; up to half of it again is added at random
    /// * `predicate` - The check applied under pressure
    pub fn new(threshold: usize, base_wait: Duration, predicate: Arc<dyn WaitPredicate<T>>) -> Self {
        Self {
            in_valve: AtomicUsize::new(0),
            threshold,
            base_wait,
            jitter: Jitter::new(),
            predicate,
        }
    }

    /// Replaces the jitter source, e.g. with a seeded one for tests
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Tries to admit `item`
    ///
    /// Every `true` must be matched by exactly one [`exit`](Self::exit).
    pub async fn wait_to_enter(&self, item: &T) -> bool {
        self.admit(item).await.is_some()
    }

    /// Releases an admission made by [`wait_to_enter`](Self::wait_to_enter)
    pub fn exit(&self, _item: &T) {
        self.release();
    }

    /// Tries to admit `item`, returning a permit that exits the valve on drop
    pub async fn enter(self: &Arc<Self>, item: &T) -> Option<ValvePermit<T>> {
        let admission = self.admit(item).await?;
        Some(ValvePermit {
            valve: Arc::clone(self),
            admission,
        })
    }

    /// Number of items currently admitted
    pub fn in_valve(&self) -> usize {
        self.in_valve.load(Ordering::SeqCst)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn base_wait(&self) -> Duration {
        self.base_wait
    }

    async fn admit(&self, item: &T) -> Option<Admission> {
        if self.try_enter_below_threshold() {
            return Some(Admission::BelowThreshold);
        }

        let timeout = self.admission_timeout();
        let admitted = tokio::time::timeout(timeout, self.predicate.wait(item, timeout))
            .await
            .unwrap_or(false);

        if !admitted {
            return None;
        }
        self.in_valve.fetch_add(1, Ordering::SeqCst);
        Some(Admission::PredicatePassed)
    }

    fn try_enter_below_threshold(&self) -> bool {
        self.in_valve
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.threshold).then_some(n + 1)
            })
            .is_ok()
    }

    fn admission_timeout(&self) -> Duration {
        self.jitter.around(self.base_wait, self.base_wait / 2)
    }

    fn release(&self) {
        let released = self
            .in_valve
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if released.is_err() {
            tracing::warn!("Valve exit without a matching entry");
        }
    }
}

/// How an item got into the valve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted on the fast path; the predicate was not consulted
    BelowThreshold,
    /// The predicate admitted the item
    PredicatePassed,
}

/// An admission into a [`PressureReliefValve`]; exits the valve when dropped
pub struct ValvePermit<T> {
    valve: Arc<PressureReliefValve<T>>,
    admission: Admission,
}

impl<T> ValvePermit<T> {
    pub fn admission(&self) -> Admission {
        self.admission
    }

    /// Whether the wait predicate already passed for this item
    pub fn predicate_passed(&self) -> bool {
        self.admission == Admission::PredicatePassed
    }
}

impl<T> Drop for ValvePermit<T> {
    fn drop(&mut self) {
        self.valve.release();
    }
}
