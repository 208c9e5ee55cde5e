//! Sumi-Fetch: polite, partitionable crawl admission
//!
//! This crate fetches large URI sets at high concurrency without overwhelming
//! any single host. It combines a per-host politeness cache, an adaptive
//! admission valve, a bounded fetch loop, and a hash-space partitioner that
//! lets independent fetcher processes split the crawl statically.

pub mod config;
pub mod crawler;
pub mod jitter;
pub mod partition;
pub mod politeness;
pub mod robots;
pub mod valve;

use thiserror::Error;

/// Main error type for Sumi-Fetch operations
#[derive(Debug, Error)]
pub enum SumiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to open {path}: {source}")]
    OpenFile {
        path: String,
        source: std::io::Error,
    },

    #[error("Work item serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Robots.txt error: {0}")]
    Robots(String),

    #[error("Output writer is already closed")]
    WriterClosed,
}

impl SumiError {
    /// Returns true if the failure is worth retrying in a later run
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Http { source, .. } | Self::Reqwest(source) => {
                source.is_timeout() || source.is_connect()
            }
            _ => false,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid partition: {0}")]
    InvalidPartition(String),
}

/// Hash-space partitioning errors
#[derive(Debug, Error, PartialEq)]
pub enum PartitionError {
    #[error("Invalid hash '{0}': expected 32 hex characters")]
    InvalidHash(String),

    #[error("Invalid range: min {min} is greater than max {max}")]
    InvalidRange { min: String, max: String },

    #[error("Weights must add up to 1.0, got {0}")]
    WeightsDoNotSumToOne(f64),

    #[error("Invalid weight {0}: weights must be positive numbers")]
    InvalidWeight(f64),

    #[error("At least one weight is required")]
    NoWeights,

    #[error("Range is too narrow to split into {0} parts")]
    RangeTooNarrow(usize),
}

/// Result type alias for Sumi-Fetch operations
pub type Result<T> = std::result::Result<T, SumiError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for partitioning operations
pub type PartitionResult<T> = std::result::Result<T, PartitionError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Orchestrator, RunSummary, WorkItem};
pub use partition::{HashRange, Md5Hash};
pub use politeness::HostCache;
pub use valve::PressureReliefValve;
