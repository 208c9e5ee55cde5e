//! Host politeness cache

use crate::config::PolitenessConfig;
use crate::jitter::Jitter;
use crate::politeness::bounded::BoundedCache;
use crate::politeness::record::HostRecord;
use crate::robots::{ParsedRobots, RobotsFetcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Per-host rate limiting and robots.txt caching
///
/// Records are created lazily on first reference and kept in a bounded LRU
/// cache so that memory stays flat however many hosts a crawl touches.
pub struct HostCache {
    records: BoundedCache<String, HostRecord>,
    robots_fetcher: Arc<dyn RobotsFetcher>,
    min_interval: Duration,
    max_crawl_delay: Duration,
    agent: String,
    jitter: Jitter,
}

impl HostCache {
    /// Creates a cache holding at most `capacity` hosts
    ///
    /// # Arguments
    ///
    /// * `min_interval` - Default minimum time between fetches to one host
    /// * `capacity` - Maximum number of host records kept in memory
    /// * `robots_fetcher` - Collaborator used on the first robots.txt lookup per host
    pub fn new(
        min_interval: Duration,
        capacity: usize,
        robots_fetcher: Arc<dyn RobotsFetcher>,
    ) -> Self {
        Self {
            records: BoundedCache::new(capacity),
            robots_fetcher,
            min_interval,
            max_crawl_delay: Duration::ZERO,
            agent: String::from("*"),
            jitter: Jitter::new(),
        }
    }

    /// Creates a cache from the politeness section of the configuration
    pub fn from_config(
        config: &PolitenessConfig,
        agent: &str,
        robots_fetcher: Arc<dyn RobotsFetcher>,
    ) -> Self {
        Self::new(
            Duration::from_millis(config.min_fetch_interval_ms),
            config.host_cache_capacity,
            robots_fetcher,
        )
        .with_agent(agent)
        .with_max_crawl_delay(Duration::from_millis(config.max_crawl_delay_ms))
    }

    /// Sets the product token used to look up robots.txt crawl delays
    pub fn with_agent(mut self, agent: &str) -> Self {
        self.agent = agent.to_string();
        self
    }

    /// Caps how far a robots.txt `Crawl-delay` may raise a host's interval
    ///
    /// Zero ignores crawl delays entirely.
    pub fn with_max_crawl_delay(mut self, max: Duration) -> Self {
        self.max_crawl_delay = max;
        self
    }

    /// Replaces the jitter source, e.g. with a seeded one for tests
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Number of host records currently cached
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.records.capacity()
    }

    pub fn contains(&self, host: &str) -> bool {
        self.records.contains(&host.to_ascii_lowercase())
    }

    /// Hosts from least to most recently referenced
    pub fn hosts_by_recency(&self) -> Vec<String> {
        self.records.keys_by_recency()
    }

    /// Returns the record for `host`, creating it if needed
    ///
    /// Counts as a use for eviction purposes. If the cache grows past its
    /// capacity, the least recently used host is dropped. Callers still holding
    /// the dropped record keep a valid reference to it.
    pub fn get_or_create_record(&self, host: &str) -> Arc<HostRecord> {
        let key = host.to_ascii_lowercase();
        let lookup = self
            .records
            .get_or_create(&key, || HostRecord::new(&key, self.min_interval));

        if let Some((evicted, _)) = lookup.evicted {
            tracing::debug!("Evicted host record for {} (capacity {})", evicted, self.capacity());
        }
        lookup.value
    }

    /// Returns the robots.txt for `host`, fetching it on first reference only
    ///
    /// Concurrent callers for the same host share a single fetch: the first one
    /// fetches while holding the host's robots lock, the rest wait for it and
    /// read the cached result. A failed fetch is logged and treated as "no
    /// restrictions" (`None`).
    pub async fn get_robots_file(&self, host: &str) -> Option<Arc<ParsedRobots>> {
        let record = self.get_or_create_record(host);

        if let Some(outcome) = record.robots_outcome() {
            return outcome;
        }

        let _guard = record.lock_robots().await;
        if let Some(outcome) = record.robots_outcome() {
            return outcome;
        }

        let outcome = match self.robots_fetcher.fetch_robots(record.host()).await {
            Ok(robots) => robots.map(Arc::new),
            Err(e) => {
                tracing::warn!("Failed to fetch robots.txt for {}: {}", record.host(), e);
                None
            }
        };

        if let Some(robots) = &outcome {
            self.apply_crawl_delay(&record, robots).await;
        }

        record.store_robots(outcome.clone());
        outcome
    }

    /// Waits until `host` may be fetched, or until `timeout` elapses
    ///
    /// Returns `true` once the host's minimum interval has passed since its last
    /// granted fetch, stamping the grant time atomically. Returns `false` if the
    /// timeout runs out first. `None` waits indefinitely.
    pub async fn wait_to_fetch(&self, host: &str, timeout: Option<Duration>) -> bool {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let record = self.get_or_create_record(host);

        loop {
            let (wait, interval) = {
                let mut gate = record.lock_gate().await;
                let now = Instant::now();
                match gate.time_until_fetchable(now) {
                    None => {
                        gate.grant(now);
                        tracing::trace!("Granted fetch #{} for {}", gate.grants(), record.host());
                        return true;
                    }
                    Some(wait) => (wait, gate.min_interval()),
                }
            };

            let mut pause = self.jitter.around(wait, interval / 8);
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    tracing::debug!("Timed out waiting to fetch from {}", record.host());
                    return false;
                }
                pause = pause.min(deadline - now);
            }

            tokio::time::sleep(pause).await;
        }
    }

    async fn apply_crawl_delay(&self, record: &HostRecord, robots: &ParsedRobots) {
        if self.max_crawl_delay.is_zero() {
            return;
        }
        let Some(delay) = robots.crawl_delay(&self.agent) else {
            return;
        };
        let delay = delay.min(self.max_crawl_delay);
        let mut gate = record.lock_gate().await;
        if gate.raise_interval(delay) {
            tracing::info!(
                "Using robots.txt crawl delay of {:?} for {}",
                delay,
                record.host()
            );
        }
    }
}
