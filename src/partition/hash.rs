use crate::PartitionError;
use std::fmt;
use std::str::FromStr;

/// A 16-byte MD5 digest ordered as a big-endian unsigned integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Md5Hash([u8; 16]);

impl Md5Hash {
    /// Number of bytes in a digest
    pub const BYTE_LEN: usize = 16;

    /// The smallest value in the keyspace
    pub const MIN: Self = Self([0x00; 16]);

    /// The largest value in the keyspace
    pub const MAX: Self = Self([0xff; 16]);

    /// Wraps raw digest bytes
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Hashes arbitrary data
    pub fn of(data: impl AsRef<[u8]>) -> Self {
        Self(md5::compute(data).0)
    }

    /// Returns the raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Interprets the digest as a big-endian unsigned integer
    pub fn to_u128(self) -> u128 {
        u128::from_be_bytes(self.0)
    }

    /// Encodes an unsigned integer back into digest form
    pub fn from_u128(value: u128) -> Self {
        Self(value.to_be_bytes())
    }
}

impl fmt::Display for Md5Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Md5Hash {
    type Err = PartitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|_| PartitionError::InvalidHash(s.to_string()))?;
        let bytes: [u8; 16] = bytes
            .try_into()
            .map_err(|_| PartitionError::InvalidHash(s.to_string()))?;
        Ok(Self(bytes))
    }
}
