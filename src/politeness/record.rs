//! Per-host politeness state

use crate::robots::ParsedRobots;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

/// How often a blocked caller reports that it is still waiting on a host lock
const ROBOTS_WAIT_REPORT: Duration = Duration::from_secs(10);
const GATE_WAIT_REPORT: Duration = Duration::from_secs(360);

/// Rate-limit bookkeeping for one host
///
/// Guarded by the record's fetch lock; only the holder may check and stamp it.
#[derive(Debug, Clone)]
pub struct FetchGate {
    /// When a fetch was last granted, if ever
    last_granted: Option<Instant>,

    /// Minimum time between two granted fetches
    min_interval: Duration,

    /// Number of grants so far
    grants: u64,
}

impl FetchGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_granted: None,
            min_interval,
            grants: 0,
        }
    }

    /// Returns how long to wait before a fetch may be granted
    ///
    /// `None` means a fetch may be granted now.
    pub fn time_until_fetchable(&self, now: Instant) -> Option<Duration> {
        let last = self.last_granted?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed >= self.min_interval {
            None
        } else {
            Some(self.min_interval - elapsed)
        }
    }

    /// Records a granted fetch
    pub fn grant(&mut self, now: Instant) {
        self.last_granted = Some(now);
        self.grants += 1;
    }

    /// Raises the minimum interval; never lowers it
    ///
    /// Returns true if the interval changed.
    pub fn raise_interval(&mut self, interval: Duration) -> bool {
        if interval > self.min_interval {
            self.min_interval = interval;
            true
        } else {
            false
        }
    }

    pub fn last_granted(&self) -> Option<Instant> {
        self.last_granted
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn grants(&self) -> u64 {
        self.grants
    }
}

/// Where a host's robots.txt lookup stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotsStatus {
    /// Nobody has asked yet
    Unchecked,
    /// A caller holds the robots lock and is fetching
    InProgress,
    /// The outcome is cached
    Checked,
}

/// Everything the politeness cache knows about one host
///
/// The two locks are independent: fetching robots.txt (slow, once) never
/// blocks the rate-limit check (fast, frequent), and vice versa.
#[derive(Debug)]
pub struct HostRecord {
    host: String,
    gate: Mutex<FetchGate>,
    robots_lock: Mutex<()>,
    robots: OnceLock<Option<Arc<ParsedRobots>>>,
}

impl HostRecord {
    pub fn new(host: &str, min_interval: Duration) -> Self {
        Self {
            host: host.to_string(),
            gate: Mutex::new(FetchGate::new(min_interval)),
            robots_lock: Mutex::new(()),
            robots: OnceLock::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Acquires the fetch gate, logging if that takes unusually long
    pub async fn lock_gate(&self) -> MutexGuard<'_, FetchGate> {
        lock_reporting(&self.gate, GATE_WAIT_REPORT, "fetch gate", &self.host).await
    }

    /// Acquires the robots lock, logging if that takes unusually long
    pub(crate) async fn lock_robots(&self) -> MutexGuard<'_, ()> {
        lock_reporting(&self.robots_lock, ROBOTS_WAIT_REPORT, "robots.txt", &self.host).await
    }

    /// The cached robots outcome: `None` until checked, then `Some(robots)`
    /// where `robots` is `None` for "no restrictions"
    pub fn robots_outcome(&self) -> Option<Option<Arc<ParsedRobots>>> {
        self.robots.get().cloned()
    }

    /// Caches the robots outcome; only the first call has any effect
    pub(crate) fn store_robots(&self, outcome: Option<Arc<ParsedRobots>>) {
        if self.robots.set(outcome).is_err() {
            tracing::debug!("robots.txt for {} was already cached", self.host);
        }
    }

    pub fn robots_checked(&self) -> bool {
        self.robots.get().is_some()
    }

    pub fn robots_status(&self) -> RobotsStatus {
        if self.robots_checked() {
            RobotsStatus::Checked
        } else if self.robots_lock.try_lock().is_err() {
            RobotsStatus::InProgress
        } else {
            RobotsStatus::Unchecked
        }
    }
}

async fn lock_reporting<'a, T>(
    mutex: &'a Mutex<T>,
    every: Duration,
    what: &str,
    host: &str,
) -> MutexGuard<'a, T> {
    loop {
        match tokio::time::timeout(every, mutex.lock()).await {
            Ok(guard) => return guard,
            Err(_) => tracing::info!("Still waiting on {} lock for {}", what, host),
        }
    }
}
