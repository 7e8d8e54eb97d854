//! Value Log
//!
//! Per-partition append-only store of fixed-length value records, addressed
//! by sequential record number.
//!
//! ## Region Format
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ Header (one 4 KiB page)                              │
//! │ ┌─────────┬──────────┬────────┬─────────┬──────────┐ │
//! │ │Magic (4)│Version(2)│ValLen  │Capacity │ Count(8) │ │
//! │ └─────────┴──────────┴────────┴─────────┴──────────┘ │
//! ├──────────────────────────────────────────────────────┤
//! │ Record 0   (value_len bytes)                         │
//! │ Record 1   (value_len bytes)                         │
//! │ ...        (pre-allocated to max_records slots)      │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The header's committed record count is the authoritative length of the
//! partition: it is published with release ordering only after a record's
//! bytes are in place, so a crash mid-append leaves at worst an uncounted
//! (and therefore invisible) slot. Index rebuild on reopen is bounded by
//! this count.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::atomic::Ordering;

use crate::error::{Result, SlateError};
use crate::region::Region;

const MAGIC: &[u8; 4] = b"SKVL";
const FORMAT_VERSION: u16 = 1;

/// Header page size; keeps record data page-aligned.
const HEADER_LEN: usize = 4096;
const COUNT_OFFSET: usize = 16;

/// Append-only fixed-record-length value store for one partition.
///
/// `append` is not internally synchronized — the engine's per-partition
/// write lock serializes appends. Reads need no lock: they bounds-check
/// against the committed count and never touch uncommitted slots.
#[derive(Debug)]
pub struct ValueLog {
    region: Region,
    // Held so the mapping's backing file outlives the region.
    _file: File,
    partition: usize,
    value_len: usize,
    capacity: usize,
}

impl ValueLog {
    /// Open or create the partition's value log region under `dir`.
    ///
    /// A fresh region is pre-allocated to `HEADER_LEN + max_records *
    /// value_len` bytes. Reopening validates the stored geometry against
    /// the configured one.
    pub fn open(dir: &Path, partition: usize, value_len: usize, max_records: usize) -> Result<Self> {
        let path = dir.join(format!("part_{:04}.vlog", partition));
        let fresh = !path.exists();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let total = HEADER_LEN as u64 + (max_records as u64) * (value_len as u64);
        if fresh {
            file.set_len(total)?;
        } else if file.metadata()?.len() != total {
            return Err(SlateError::Storage(format!(
                "value log {} has length {}, expected {}",
                path.display(),
                file.metadata()?.len(),
                total
            )));
        }

        let region = Region::map(&file)?;
        let log = Self {
            region,
            _file: file,
            partition,
            value_len,
            capacity: max_records,
        };

        if fresh {
            log.write_header();
        } else {
            log.check_header(&path)?;
        }
        Ok(log)
    }

    fn write_header(&self) {
        let mut header = [0u8; 16];
        header[0..4].copy_from_slice(MAGIC);
        header[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        header[8..12].copy_from_slice(&(self.value_len as u32).to_le_bytes());
        header[12..16].copy_from_slice(&(self.capacity as u32).to_le_bytes());
        // Safety: the region was just created and is not shared yet.
        unsafe { self.region.write(0, &header) };
        self.region.atomic_u64(COUNT_OFFSET).store(0, Ordering::Release);
    }

    fn check_header(&self, path: &Path) -> Result<()> {
        let mut header = [0u8; 16];
        self.region.read_into(0, &mut header);
        if &header[0..4] != MAGIC {
            return Err(SlateError::Storage(format!(
                "value log {} has invalid magic {:?}",
                path.display(),
                &header[0..4]
            )));
        }
        let version = u16::from_le_bytes(header[4..6].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(SlateError::Storage(format!(
                "value log {} has unsupported version {}",
                path.display(),
                version
            )));
        }
        let value_len = u32::from_le_bytes(header[8..12].try_into().unwrap()) as usize;
        let capacity = u32::from_le_bytes(header[12..16].try_into().unwrap()) as usize;
        if value_len != self.value_len || capacity != self.capacity {
            return Err(SlateError::Storage(format!(
                "value log {} geometry mismatch: on disk value_len={} capacity={}, configured value_len={} capacity={}",
                path.display(),
                value_len,
                capacity,
                self.value_len,
                self.capacity
            )));
        }
        let count = self.record_count();
        if count > capacity as u64 {
            return Err(SlateError::Storage(format!(
                "value log {} count {} exceeds capacity {}",
                path.display(),
                count,
                capacity
            )));
        }
        Ok(())
    }

    /// Append one record, returning its record number.
    ///
    /// The record bytes land in the slot at the committed count, then the
    /// count is published with release ordering; a concurrent reader can
    /// never observe the record number before its bytes.
    ///
    /// Callers must serialize appends per partition (the engine's partition
    /// write lock).
    pub fn append(&self, value: &[u8]) -> Result<u32> {
        if value.len() != self.value_len {
            return Err(SlateError::InvalidValueLength {
                expected: self.value_len,
                actual: value.len(),
            });
        }
        let count = self.region.atomic_u64(COUNT_OFFSET).load(Ordering::Relaxed) as usize;
        if count >= self.capacity {
            return Err(SlateError::CapacityExceeded {
                partition: self.partition,
                capacity: self.capacity,
            });
        }

        // Safety: exclusive appender (caller holds the partition write
        // lock) and the slot is above the published count.
        unsafe {
            self.region.write(HEADER_LEN + count * self.value_len, value);
        }
        self.region
            .atomic_u64(COUNT_OFFSET)
            .store(count as u64 + 1, Ordering::Release);
        Ok(count as u32)
    }

    /// Read the record at `record_no` into a fresh buffer.
    pub fn read_record(&self, record_no: u32) -> Result<Vec<u8>> {
        let mut value = vec![0u8; self.value_len];
        self.read_range_into(record_no, 1, &mut value)?;
        Ok(value)
    }

    /// Copy `count` consecutive records starting at `first` into `dst`.
    /// Used by the scan producer to prefetch whole partitions chunk by
    /// chunk.
    pub fn read_range_into(&self, first: u32, count: usize, dst: &mut [u8]) -> Result<()> {
        let committed = self.record_count();
        let end = first as u64 + count as u64;
        if end > committed {
            return Err(SlateError::Storage(format!(
                "partition {} read of records {}..{} past committed count {}",
                self.partition, first, end, committed
            )));
        }
        if dst.len() != count * self.value_len {
            return Err(SlateError::Storage(format!(
                "partition {} read buffer of {} bytes for {} records",
                self.partition,
                dst.len(),
                count
            )));
        }
        self.region
            .read_into(HEADER_LEN + first as usize * self.value_len, dst);
        Ok(())
    }

    /// Number of committed records. Acquire-ordered against the append
    /// that published them.
    pub fn record_count(&self) -> u64 {
        self.region.atomic_u64(COUNT_OFFSET).load(Ordering::Acquire)
    }

    pub fn value_len(&self) -> usize {
        self.value_len
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Flush the mapped region back to its file. The mapping itself is
    /// released when the log is dropped.
    pub fn close(&self) -> Result<()> {
        self.region.flush()?;
        Ok(())
    }
}
