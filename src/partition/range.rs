//! Inclusive ranges over the MD5 keyspace

use crate::partition::Md5Hash;
use crate::{PartitionError, PartitionResult};
use std::fmt;
use std::str::FromStr;

/// Weights are fixed at four decimal digits (basis points)
pub const WEIGHT_SCALE: u128 = 10_000;

/// An inclusive `[min, max]` slice of the keyspace
///
/// A range is valid by construction: `min <= max` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashRange {
    min: Md5Hash,
    max: Md5Hash,
}

impl HashRange {
    /// Creates a range, rejecting `min > max`
    pub fn new(min: Md5Hash, max: Md5Hash) -> PartitionResult<Self> {
        if min > max {
            return Err(PartitionError::InvalidRange {
                min: min.to_string(),
                max: max.to_string(),
            });
        }
        Ok(Self { min, max })
    }

    /// The whole keyspace
    pub const fn full() -> Self {
        Self {
            min: Md5Hash::MIN,
            max: Md5Hash::MAX,
        }
    }

    pub fn min(&self) -> Md5Hash {
        self.min
    }

    pub fn max(&self) -> Md5Hash {
        self.max
    }

    /// Returns true if `min <= hash <= max`
    pub fn contains(&self, hash: &Md5Hash) -> bool {
        self.min <= *hash && *hash <= self.max
    }

    /// Fraction of the full keyspace this range represents
    pub fn coverage_ratio(&self) -> f64 {
        let diff = self.max.to_u128() - self.min.to_u128();
        let full = Md5Hash::MAX.to_u128() - Md5Hash::MIN.to_u128();
        diff as f64 / full as f64
    }

    /// Splits the range into contiguous sub-ranges sized by `weights`
    ///
    /// Weights must have at most four decimal digits and add up to exactly
    /// 1.0; they are never normalised. Each sub-range starts one past the end
    /// of the previous one and the last ends at `self.max()`, so the result
    /// covers the input exactly with no gaps or overlaps.
    ///
    /// # Errors
    ///
    /// * `NoWeights` - `weights` is empty
    /// * `InvalidWeight` - a weight is not a positive number exactly representable at four-digit precision
    /// * `WeightsDoNotSumToOne` - the weights do not add up to 1.0
    /// * `RangeTooNarrow` - a sub-range would be empty
    pub fn split(&self, weights: &[f64]) -> PartitionResult<Vec<HashRange>> {
        if weights.is_empty() {
            return Err(PartitionError::NoWeights);
        }

        let basis_points = weights
            .iter()
            .map(|w| to_basis_points(*w))
            .collect::<PartitionResult<Vec<_>>>()?;

        if basis_points.iter().sum::<u128>() != WEIGHT_SCALE {
            return Err(PartitionError::WeightsDoNotSumToOne(weights.iter().sum()));
        }

        let min = self.min.to_u128();
        let max = self.max.to_u128();
        let diff = max - min;
        let parts = basis_points.len();

        let mut ranges = Vec::with_capacity(parts);
        let mut start = min;
        let mut cumulative = 0u128;

        for (i, bp) in basis_points.iter().enumerate() {
            cumulative += bp;
            let last = i + 1 == parts;
            let end = if last {
                max
            } else {
                min + scale(diff, cumulative)
            };

            if end < start {
                return Err(PartitionError::RangeTooNarrow(parts));
            }

            ranges.push(HashRange {
                min: Md5Hash::from_u128(start),
                max: Md5Hash::from_u128(end),
            });

            if !last {
                start = end
                    .checked_add(1)
                    .ok_or(PartitionError::RangeTooNarrow(parts))?;
            }
        }

        Ok(ranges)
    }
}

/// Returns `count` weights that add up to exactly 1.0 at four-digit precision
///
/// Any remainder goes to the last weight. Counts above `WEIGHT_SCALE` cannot be
/// represented and produce weights that `split` rejects.
pub fn equal_weights(count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    let count_u = count as u128;
    let base = WEIGHT_SCALE / count_u;
    let remainder = WEIGHT_SCALE - base * count_u;

    (0..count)
        .map(|i| {
            let bp = if i + 1 == count { base + remainder } else { base };
            bp as f64 / WEIGHT_SCALE as f64
        })
        .collect()
}

/// Tolerance for float noise when checking four-digit precision
const WEIGHT_EPSILON: f64 = 1e-6;

fn to_basis_points(weight: f64) -> PartitionResult<u128> {
    if !weight.is_finite() || weight <= 0.0 || weight > 1.0 {
        return Err(PartitionError::InvalidWeight(weight));
    }
    let scaled = weight * WEIGHT_SCALE as f64;
    let rounded = scaled.round();
    // Finer weights would be silently rounded into a sum of exactly 1.0
    if (scaled - rounded).abs() > WEIGHT_EPSILON || rounded < 1.0 {
        return Err(PartitionError::InvalidWeight(weight));
    }
    Ok(rounded as u128)
}

/// `floor(value * bp / WEIGHT_SCALE)` without overflowing `u128`
fn scale(value: u128, bp: u128) -> u128 {
    (value / WEIGHT_SCALE) * bp + (value % WEIGHT_SCALE) * bp / WEIGHT_SCALE
}

impl fmt::Display for HashRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.min, self.max)
    }
}

impl FromStr for HashRange {
    type Err = PartitionError;

    /// Parses `MINHEX..MAXHEX`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (min, max) = s
            .split_once("..")
            .ok_or_else(|| PartitionError::InvalidHash(s.to_string()))?;
        HashRange::new(min.parse()?, max.parse()?)
    }
}
