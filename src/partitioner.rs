//! Key partitioners.

use serde::Serialize;
use sha1::{Digest, Sha1};

/// Default number of partitions.
pub const DEFAULT_NUM_PARTITIONS: u32 = 32;

/// Assigns a partition to a key. The same key must always be assigned the same partition,
/// whichever worker maps it.
pub trait Partitioner<K>: Send + Sync {
    /// Calculates the partition of the key.
    fn partition(&self, key: &K) -> Result<u32, serde_json::Error>;
}

/// Hash partitioner.
/// Calculates partitions using the leading 20 bits of the SHA-1 digest of the key's JSON representation
/// modulo the number of partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashPartitioner {
    num_partitions: u32,
}

impl HashPartitioner {
    /// Creates a partitioner distributing keys over `num_partitions` partitions.
    ///
    /// # Panics
    /// Panics if `num_partitions` is zero.
    pub fn new(num_partitions: u32) -> Self {
        assert!(num_partitions > 0, "number of partitions must be positive");

        HashPartitioner { num_partitions }
    }

    /// Returns the number of partitions.
    pub fn num_partitions(&self) -> u32 {
        self.num_partitions
    }
}

impl Default for HashPartitioner {
    fn default() -> Self {
        HashPartitioner::new(DEFAULT_NUM_PARTITIONS)
    }
}

impl<K: Serialize> Partitioner<K> for HashPartitioner {
    fn partition(&self, key: &K) -> Result<u32, serde_json::Error> {
        let digest = Sha1::digest(serde_json::to_vec(key)?);
        let prefix = (digest[0] as u32) << 12 | (digest[1] as u32) << 4 | (digest[2] as u32) >> 4;

        return Ok(prefix % self.num_partitions);
    }
}
