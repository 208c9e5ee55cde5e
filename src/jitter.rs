//! Randomized wait offsets
//!
//! Many tasks waiting on the same host or the same admission threshold would
//! otherwise wake up in lockstep. A small random offset spreads them out.
//! Seed the generator to make the offsets reproducible in tests.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Source of bounded random offsets added to base wait times
#[derive(Debug)]
pub struct Jitter {
    rng: Mutex<fastrand::Rng>,
}

impl Jitter {
    /// Creates a jitter source seeded from system entropy
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::new()),
        }
    }

    /// Creates a reproducible jitter source
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::with_seed(seed)),
        }
    }

    /// Returns a random offset in `[0, max]`, with millisecond resolution
    pub fn offset(&self, max: Duration) -> Duration {
        let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Duration::from_millis(rng.u64(0..=max_ms))
    }

    /// Returns `base` plus a random offset in `[0, spread]`
    pub fn around(&self, base: Duration, spread: Duration) -> Duration {
        base.saturating_add(self.offset(spread))
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Self::new()
    }
}
