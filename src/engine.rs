//! Engine Module
//!
//! The partition router and lifecycle owner: one (value log, offset index)
//! pair per partition, a pure partitioner routing keys to pairs, and the
//! scan pipeline for batched full-keyspace scans.
//!
//! ## Concurrency Model
//!
//! - **Writes**: serialized per partition by that partition's mutex. The
//!   value-log append and the index append share one critical section, so
//!   a lookup can never observe a record number whose value is not yet
//!   committed. Writers to different partitions never contend.
//! - **Reads**: take no partition lock. The index probe is a read-lock on
//!   the in-memory table; the log read bounds-checks against the
//!   acquire-loaded committed count.
//! - **Scans**: run on the pipeline's own threads against snapshots; they
//!   never block writers.
//!
//! Per-partition readiness is an explicit state machine
//! (`Uninitialized → Rebuilding → Ready`) advanced by compare-and-set
//! during startup rebuild.

use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{Result, SlateError};
use crate::index::OffsetIndex;
use crate::log::ValueLog;
use crate::partition::{HighBitsPartitioner, Partitioner};
use crate::scan::{ScanPipeline, VisitFn};
use crate::KEY_LEN;

// Partition readiness states.
const STATE_UNINITIALIZED: u8 = 0;
const STATE_REBUILDING: u8 = 1;
const STATE_READY: u8 = 2;

/// One shard: a value log, its offset index, and the lock serializing the
/// paired append. The index's association to the log is non-owning — the
/// engine passes the log into `rebuild` at the call site.
#[derive(Debug)]
pub(crate) struct Partition {
    pub(crate) log: ValueLog,
    pub(crate) index: OffsetIndex,
    write_lock: Mutex<()>,
    state: AtomicU8,
}

impl Partition {
    fn check_ready(&self, id: usize) -> Result<()> {
        if self.state.load(Ordering::Acquire) != STATE_READY {
            return Err(SlateError::Storage(format!("partition {id} is not ready")));
        }
        Ok(())
    }
}

pub(crate) type PartitionSet = Vec<Partition>;

/// The main storage engine
#[derive(Debug)]
pub struct Engine {
    config: Config,
    partitioner: HighBitsPartitioner,
    partitions: Arc<PartitionSet>,
    scan: ScanPipeline,
    write_first: AtomicBool,
    read_first: AtomicBool,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate the config and create the data directory
    /// 2. Open each partition's value log, then its offset index
    /// 3. If any partition's index region pre-existed, rebuild every
    ///    partition's in-memory table on a bounded worker pool and join
    ///    before accepting any call
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let mut partitions = Vec::with_capacity(config.partition_count);
        for id in 0..config.partition_count {
            let log = ValueLog::open(&config.data_dir, id, config.value_len, config.max_records)?;
            let index = OffsetIndex::open(&config.data_dir, id, config.max_records)?;
            partitions.push(Partition {
                log,
                index,
                write_lock: Mutex::new(()),
                state: AtomicU8::new(STATE_UNINITIALIZED),
            });
        }

        let needs_rebuild = partitions.iter().any(|p| p.index.pre_existing());
        if needs_rebuild {
            rebuild_all(&partitions, config.rebuild_threads)?;
        } else {
            for part in &partitions {
                part.state.store(STATE_READY, Ordering::Release);
            }
        }

        let partitions = Arc::new(partitions);
        let scan = ScanPipeline::new(
            Arc::clone(&partitions),
            config.batch_width,
            config.value_len,
            config.scan_chunk_bytes,
        );

        tracing::info!(
            data_dir = %config.data_dir.display(),
            partitions = config.partition_count,
            value_len = config.value_len,
            rebuilt = needs_rebuild,
            "engine opened"
        );

        let partitioner = HighBitsPartitioner::new(config.partition_count);
        Ok(Self {
            config,
            partitioner,
            partitions,
            scan,
            write_first: AtomicBool::new(false),
            read_first: AtomicBool::new(false),
        })
    }

    /// Write a key-value pair
    ///
    /// The value-log append and the index append run inside the target
    /// partition's critical section: a record number becomes visible to
    /// lookups only after its value is durably appended.
    ///
    /// A repeated key appends a new record and repoints the index entry;
    /// the old record stays physically present but unreachable.
    pub fn write(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if self
            .write_first
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::info!("first write accepted");
        }

        let key = decode_key(key)?;
        let id = self.partitioner.partition_of(key);
        let part = &self.partitions[id];
        part.check_ready(id)?;

        let _guard = part.write_lock.lock();
        let record_no = part.log.append(value)?;
        part.index.append(key, record_no)?;
        Ok(())
    }

    /// Read the value for a key
    ///
    /// Takes no partition lock: the index probe and the log read only
    /// touch published state.
    pub fn read(&self, key: &[u8]) -> Result<Vec<u8>> {
        if self
            .read_first
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::info!("first read accepted");
        }

        let key = decode_key(key)?;
        let id = self.partitioner.partition_of(key);
        let part = &self.partitions[id];
        part.check_ready(id)?;

        let record_no = part.index.lookup(key).ok_or(SlateError::KeyNotFound)?;
        part.log.read_record(record_no)
    }

    /// Scan the full keyspace, invoking `visit(key, value)` once per live
    /// key: partitions in ascending order, keys in insertion order within
    /// a partition.
    ///
    /// `lower` and `upper` are advisory and never enforced — the pipeline
    /// always walks the entire keyspace and bound filtering belongs to the
    /// visitor. Blocks until this caller's whole batch completes; a batch
    /// only starts once `batch_width` callers are pending.
    pub fn range<F>(&self, lower: &[u8], upper: &[u8], visit: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) + Send + 'static,
    {
        let _ = (lower, upper);
        self.scan.execute(Box::new(visit) as VisitFn)
    }

    /// Close the engine, consuming it
    ///
    /// Shuts the scan pipeline down (abandoning any partially collected
    /// batch, whose callers are unparked with an error), then flushes and
    /// releases every partition's regions. Best-effort: individual
    /// resource-release failures are logged, never propagated.
    pub fn close(self) {
        self.scan.shutdown();
        for (id, part) in self.partitions.iter().enumerate() {
            if let Err(e) = part.log.close() {
                tracing::error!(partition = id, error = %e, "value log close failed");
            }
            if let Err(e) = part.index.close() {
                tracing::error!(partition = id, error = %e, "offset index close failed");
            }
        }
        tracing::info!("engine closed");
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Total live keys across all partitions
    pub fn key_count(&self) -> usize {
        self.partitions.iter().map(|p| p.index.len()).sum()
    }

    /// Total committed records across all partitions (orphaned records
    /// from overwrites included)
    pub fn record_count(&self) -> u64 {
        self.partitions.iter().map(|p| p.log.record_count()).sum()
    }
}

/// Decode an 8-byte big-endian key.
fn decode_key(key: &[u8]) -> Result<u64> {
    let bytes: [u8; KEY_LEN] = key.try_into().map_err(|_| SlateError::InvalidKeyLength {
        expected: KEY_LEN,
        actual: key.len(),
    })?;
    Ok(u64::from_be_bytes(bytes))
}

/// Rebuild every partition's in-memory table from its persisted region,
/// fanned out over a bounded pool and joined before the engine opens.
fn rebuild_all(partitions: &PartitionSet, threads: usize) -> Result<()> {
    let started_at = Instant::now();
    let next = AtomicUsize::new(0);
    let failure: Mutex<Option<SlateError>> = Mutex::new(None);
    let workers = threads.min(partitions.len());

    crossbeam::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|_| loop {
                let id = next.fetch_add(1, Ordering::Relaxed);
                if id >= partitions.len() {
                    break;
                }
                let part = &partitions[id];
                if part
                    .state
                    .compare_exchange(
                        STATE_UNINITIALIZED,
                        STATE_REBUILDING,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_err()
                {
                    continue;
                }
                match part.index.rebuild(&part.log) {
                    Ok(()) => part.state.store(STATE_READY, Ordering::Release),
                    Err(e) => {
                        tracing::error!(partition = id, error = %e, "index rebuild failed");
                        *failure.lock() = Some(e);
                    }
                }
            });
        }
    })
    .map_err(|_| SlateError::Storage("index rebuild worker panicked".to_string()))?;

    if let Some(e) = failure.into_inner() {
        return Err(e);
    }
    tracing::info!(
        partitions = partitions.len(),
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        "rebuilt offset indexes"
    );
    Ok(())
}
