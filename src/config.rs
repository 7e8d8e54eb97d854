//! Configuration for SlateKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, SlateError};

/// Main configuration for a SlateKV engine instance
///
/// Every geometry field (`partition_count`, `value_len`, `max_records`) is
/// fixed for the lifetime of the data directory: reopening an existing
/// directory with a different geometry is rejected at `open`.
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files.
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── part_0000.vlog   (value log region, partition 0)
    ///     ├── part_0000.idx    (offset index region, partition 0)
    ///     └── ...              (one pair per partition)
    pub data_dir: PathBuf,

    /// Number of partitions. Must be a power of two so the partitioner can
    /// route on the high-order bits of the key.
    pub partition_count: usize,

    /// Width of every value record, in bytes.
    pub value_len: usize,

    /// Maximum records per partition. Both per-partition regions are
    /// pre-allocated to this capacity at creation; there is no resize path.
    pub max_records: usize,

    // -------------------------------------------------------------------------
    // Scan Configuration
    // -------------------------------------------------------------------------
    /// Batch width W: the number of concurrent `range` callers collected
    /// before a scan batch starts. A batch never starts with fewer than W
    /// pending callers, so embedders must size this to their actual
    /// concurrency.
    pub batch_width: usize,

    /// Byte size of one prefetch chunk inside a scan buffer.
    pub scan_chunk_bytes: usize,

    // -------------------------------------------------------------------------
    // Startup Configuration
    // -------------------------------------------------------------------------
    /// Worker threads used to rebuild partition indexes on reopen.
    pub rebuild_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./slatekv_data"),
            partition_count: 64,
            value_len: 4096,
            max_records: 252_000,
            batch_width: 64,
            scan_chunk_bytes: 4 * 1024 * 1024, // 4 MB
            rebuild_threads: 8,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validate the configuration before the engine touches the filesystem
    pub fn validate(&self) -> Result<()> {
        if self.partition_count == 0 || !self.partition_count.is_power_of_two() {
            return Err(SlateError::Config(format!(
                "partition_count must be a nonzero power of two, got {}",
                self.partition_count
            )));
        }
        if self.value_len == 0 {
            return Err(SlateError::Config("value_len must be nonzero".to_string()));
        }
        if self.max_records == 0 {
            return Err(SlateError::Config("max_records must be nonzero".to_string()));
        }
        // Record numbers are stored as 4-byte index entries.
        if self.max_records > u32::MAX as usize {
            return Err(SlateError::Config(format!(
                "max_records {} exceeds the 4-byte record number range",
                self.max_records
            )));
        }
        if self.batch_width == 0 {
            return Err(SlateError::Config("batch_width must be nonzero".to_string()));
        }
        if self.rebuild_threads == 0 {
            return Err(SlateError::Config(
                "rebuild_threads must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all partition regions)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the partition count (must be a power of two)
    pub fn partition_count(mut self, count: usize) -> Self {
        self.config.partition_count = count;
        self
    }

    /// Set the fixed value record width (in bytes)
    pub fn value_len(mut self, len: usize) -> Self {
        self.config.value_len = len;
        self
    }

    /// Set the per-partition record capacity
    pub fn max_records(mut self, count: usize) -> Self {
        self.config.max_records = count;
        self
    }

    /// Set the scan batch width W
    pub fn batch_width(mut self, width: usize) -> Self {
        self.config.batch_width = width;
        self
    }

    /// Set the scan prefetch chunk size (in bytes)
    pub fn scan_chunk_bytes(mut self, bytes: usize) -> Self {
        self.config.scan_chunk_bytes = bytes;
        self
    }

    /// Set the index rebuild pool size
    pub fn rebuild_threads(mut self, count: usize) -> Self {
        self.config.rebuild_threads = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
