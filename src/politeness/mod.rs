//! Host politeness module
//!
//! This module keeps per-host state for polite crawling:
//!
//! - `HostCache`: rate limiting and single-flight robots.txt lookups per host
//! - `HostRecord`: the state for one host, with independent robots and fetch locks
//! - `BoundedCache`: capacity-bounded map with a pluggable eviction policy
//! - `RecencyIndex`: least-recently-used ordering, the default eviction policy

mod bounded;
mod cache;
mod record;
mod recency;

pub use bounded::{BoundedCache, Lookup};
pub use cache::HostCache;
pub use record::{FetchGate, HostRecord, RobotsStatus};
pub use recency::{EvictionPolicy, RecencyIndex};
