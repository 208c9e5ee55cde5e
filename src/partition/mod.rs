//! Hash-space partitioning
//!
//! This module divides the 16-byte MD5 keyspace into contiguous ranges so that
//! independent fetcher processes can each claim a disjoint slice of the crawl
//! without coordinating at runtime.
//!
//! # Example
//!
//! ```
//! use sumi_fetch::partition::{host_hash, HashRange};
//!
//! let ranges = HashRange::full().split(&[0.5, 0.5]).unwrap();
//! let hash = host_hash("example.com");
//! assert_eq!(ranges.iter().filter(|r| r.contains(&hash)).count(), 1);
//! ```

mod hash;
mod range;

pub use hash::Md5Hash;
pub use range::{equal_weights, HashRange, WEIGHT_SCALE};

/// Computes the partition key of a host
///
/// Host names are case-insensitive, so the key is taken over the lower-cased
/// form.
pub fn host_hash(host: &str) -> Md5Hash {
    Md5Hash::of(host.to_ascii_lowercase())
}
