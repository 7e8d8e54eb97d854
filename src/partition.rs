//! Partitioner
//!
//! Pure key-to-partition routing. The mapping must stay stable for the
//! lifetime of a data directory: changing it orphans every record written
//! under the old routing.

/// Maps a key to a partition index in `[0, partition_count)`.
///
/// Implementations must be pure and deterministic: the same key always
/// routes to the same partition, across calls and across restarts.
pub trait Partitioner {
    fn partition_of(&self, key: u64) -> usize;
}

/// Routes on the high-order bits of the big-endian key.
///
/// For a power-of-two partition count `2^b`, the partition index is the top
/// `b` bits of the key, which spreads uniformly distributed keys evenly
/// across partitions.
#[derive(Debug, Clone, Copy)]
pub struct HighBitsPartitioner {
    bits: u32,
}

impl HighBitsPartitioner {
    /// `partition_count` must be a nonzero power of two (validated by
    /// `Config::validate` before the engine constructs the partitioner).
    pub fn new(partition_count: usize) -> Self {
        debug_assert!(partition_count.is_power_of_two());
        Self {
            bits: partition_count.trailing_zeros(),
        }
    }
}

impl Partitioner for HighBitsPartitioner {
    fn partition_of(&self, key: u64) -> usize {
        if self.bits == 0 {
            0
        } else {
            (key >> (64 - self.bits)) as usize
        }
    }
}
