//! Offset Index
//!
//! Per-partition mapping from key to record number: a headerless persisted
//! log of (key, record number) entries plus an in-memory hash table for
//! O(1) lookups.
//!
//! ## Region Format
//! ```text
//! ┌───────────────────────────────────────────┐
//! │ Entry 0                                   │
//! │ ┌──────────────┬────────────────────────┐ │
//! │ │ Key (8, LE)  │ Record number (4, LE)  │ │
//! │ └──────────────┴────────────────────────┘ │
//! ├───────────────────────────────────────────┤
//! │ Entry 1 ...  (pre-allocated to capacity)  │
//! └───────────────────────────────────────────┘
//! ```
//!
//! The in-memory table is not durable. On reopen the engine replays the
//! persisted entries, bounded by the paired value log's committed record
//! count: anything past that count is a stale write from a crash
//! mid-append and is ignored. The value log is authoritative; this index
//! only caches faster lookups over it.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{Result, SlateError};
use crate::log::ValueLog;
use crate::region::Region;
use crate::INDEX_ENTRY_LEN;

/// Insertion-ordered snapshot of a partition's in-memory offset table,
/// taken for one scan batch. `keys[j]` pairs with `record_nos[j]`.
#[derive(Debug, Clone, Default)]
pub struct OffsetSnapshot {
    pub keys: Vec<u64>,
    pub record_nos: Vec<u32>,
}

impl OffsetSnapshot {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Dense in-memory view: key → slot into the parallel insertion-ordered
/// arrays. Re-writing a key updates its slot's record number in place, so
/// the arrays hold exactly one entry per live key and the scan pipeline
/// never has to re-derive iteration order from the hash map.
#[derive(Debug)]
struct MemIndex {
    slots: HashMap<u64, u32>,
    keys: Vec<u64>,
    record_nos: Vec<u32>,
}

impl MemIndex {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: HashMap::with_capacity(capacity),
            keys: Vec::with_capacity(capacity),
            record_nos: Vec::with_capacity(capacity),
        }
    }

    fn insert(&mut self, key: u64, record_no: u32) {
        match self.slots.get(&key) {
            Some(&slot) => self.record_nos[slot as usize] = record_no,
            None => {
                let slot = self.keys.len() as u32;
                self.slots.insert(key, slot);
                self.keys.push(key);
                self.record_nos.push(record_no);
            }
        }
    }

    fn get(&self, key: u64) -> Option<u32> {
        self.slots
            .get(&key)
            .map(|&slot| self.record_nos[slot as usize])
    }
}

/// Persisted + in-memory index for one partition.
#[derive(Debug)]
pub struct OffsetIndex {
    region: Region,
    _file: File,
    partition: usize,
    capacity: usize,
    /// Byte cursor into the persisted region; the next entry's slot is
    /// reserved with an atomic fetch-add.
    wrote_pos: AtomicU64,
    mem: RwLock<MemIndex>,
    pre_existing: bool,
}

impl OffsetIndex {
    /// Open or create the partition's index region under `dir`.
    ///
    /// Reports whether the region pre-existed; a pre-existing region means
    /// the in-memory table must be rebuilt before the partition serves
    /// lookups.
    pub fn open(dir: &Path, partition: usize, max_records: usize) -> Result<Self> {
        let path = dir.join(format!("part_{:04}.idx", partition));
        let pre_existing = path.exists();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let total = (max_records * INDEX_ENTRY_LEN) as u64;
        if !pre_existing {
            file.set_len(total)?;
        } else if file.metadata()?.len() != total {
            return Err(SlateError::Storage(format!(
                "offset index {} has length {}, expected {}",
                path.display(),
                file.metadata()?.len(),
                total
            )));
        }

        let region = Region::map(&file)?;
        Ok(Self {
            region,
            _file: file,
            partition,
            capacity: max_records,
            wrote_pos: AtomicU64::new(0),
            mem: RwLock::new(MemIndex::with_capacity(max_records)),
            pre_existing,
        })
    }

    /// True when the persisted region pre-existed this open and the
    /// in-memory table needs a rebuild from it.
    pub fn pre_existing(&self) -> bool {
        self.pre_existing
    }

    /// Replay the persisted region into the in-memory table, bounded by
    /// the paired value log's committed record count, and park the write
    /// cursor after the last trusted entry.
    ///
    /// The log is the non-owning collaborator here: the engine passes its
    /// partition's log at the call site, the index never holds it.
    pub fn rebuild(&self, log: &ValueLog) -> Result<()> {
        let count = log.record_count() as usize;
        if count > self.capacity {
            return Err(SlateError::Storage(format!(
                "partition {} log count {} exceeds index capacity {}",
                self.partition, count, self.capacity
            )));
        }

        let mut mem = self.mem.write();
        let mut entry = [0u8; INDEX_ENTRY_LEN];
        for i in 0..count {
            self.region.read_into(i * INDEX_ENTRY_LEN, &mut entry);
            let key = u64::from_le_bytes(entry[0..8].try_into().unwrap());
            let record_no = u32::from_le_bytes(entry[8..12].try_into().unwrap());
            mem.insert(key, record_no);
        }
        self.wrote_pos
            .store((count * INDEX_ENTRY_LEN) as u64, Ordering::Release);
        Ok(())
    }

    /// Persist (key, record_no) at the next reserved slot and make it
    /// visible to lookups.
    ///
    /// Slot reservation is a single atomic fetch-add, safe under
    /// concurrent callers even though the engine only ever has one writer
    /// per partition inside its critical section.
    pub fn append(&self, key: u64, record_no: u32) -> Result<()> {
        let pos = self
            .wrote_pos
            .fetch_add(INDEX_ENTRY_LEN as u64, Ordering::Relaxed) as usize;
        if pos + INDEX_ENTRY_LEN > self.capacity * INDEX_ENTRY_LEN {
            return Err(SlateError::CapacityExceeded {
                partition: self.partition,
                capacity: self.capacity,
            });
        }

        let mut entry = [0u8; INDEX_ENTRY_LEN];
        entry[0..8].copy_from_slice(&key.to_le_bytes());
        entry[8..12].copy_from_slice(&record_no.to_le_bytes());
        // Safety: the slot was reserved above and the engine serializes
        // index appends per partition.
        unsafe { self.region.write(pos, &entry) };

        self.mem.write().insert(key, record_no);
        Ok(())
    }

    /// O(1) probe; `None` for a key never written. No side effects.
    pub fn lookup(&self, key: u64) -> Option<u32> {
        self.mem.read().get(key)
    }

    /// Snapshot the in-memory table in insertion order for one scan batch.
    pub fn offset_arrays(&self) -> OffsetSnapshot {
        let mem = self.mem.read();
        OffsetSnapshot {
            keys: mem.keys.clone(),
            record_nos: mem.record_nos.clone(),
        }
    }

    /// Number of live keys in the in-memory table.
    pub fn len(&self) -> usize {
        self.mem.read().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush the mapped region back to its file.
    pub fn close(&self) -> Result<()> {
        self.region.flush()?;
        Ok(())
    }
}
