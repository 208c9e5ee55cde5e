//! Configuration module for Sumi-Fetch
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every key has a default, so an empty file (or no file at all) is a valid
//! configuration.
//!
//! # Example
//!
//! ```no_run
//! use sumi_fetch::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Max fetches in flight: {}", config.fetcher.max_concurrent_fetches);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, FetcherConfig, IoConfig, PartitionConfig, PolitenessConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{partition_range, validate};
