use serde::Deserialize;

/// Main configuration structure for Sumi-Fetch
///
/// Every section is optional; missing keys fall back to the defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fetcher: FetcherConfig,
    pub politeness: PolitenessConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub io: IoConfig,
    pub partition: Option<PartitionConfig>,
}

/// Fetch loop and admission settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FetcherConfig {
    /// Maximum number of fetches in flight at once
    pub max_concurrent_fetches: usize,

    /// Number of admitted items before the valve starts checking host politeness
    pub pressure_threshold: usize,

    /// Base time an item may wait for admission once the valve is under pressure (milliseconds)
    pub valve_wait_ms: u64,

    /// How often to report a blocked wait for a fetch slot (milliseconds)
    pub slot_wait_log_ms: u64,

    /// How often to report status while draining (milliseconds)
    pub status_interval_ms: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 1000,
            pressure_threshold: 100,
            valve_wait_ms: 10_000,
            slot_wait_log_ms: 360_000,
            status_interval_ms: 30_000,
        }
    }
}

/// Per-host politeness settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PolitenessConfig {
    /// Minimum time between requests to the same host (milliseconds)
    pub min_fetch_interval_ms: u64,

    /// Maximum number of host records kept in memory
    pub host_cache_capacity: usize,

    /// Upper bound for robots.txt crawl delays (milliseconds, 0 ignores them)
    pub max_crawl_delay_ms: u64,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            min_fetch_interval_ms: 5_000,
            host_cache_capacity: 10_000,
            max_crawl_delay_ms: 60_000,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler, also its robots.txt product token
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Email address for crawler-related contact
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SumiFetch".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/bot".to_string(),
            contact_email: "bot@example.com".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Formats the User-Agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Input and output locations
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct IoConfig {
    /// Work item source (stdin when unset)
    pub input_path: Option<String>,

    /// Output envelope destination (stdout when unset)
    pub output_path: Option<String>,

    /// Requeue file (requeueing disabled when unset)
    pub requeue_path: Option<String>,

    /// Whether the input holds one bare URI per line instead of JSON work items
    pub raw_input: bool,
}

/// The slice of the hash keyspace this node is responsible for
#[derive(Debug, Clone, Deserialize)]
pub struct PartitionConfig {
    /// Lower bound, 32 hex characters
    pub min: String,

    /// Upper bound, 32 hex characters
    pub max: String,
}
