//! Fetch producer
//!
//! Dedicated thread that prefetches each partition's committed value
//! region into a recycled scan buffer, one batch at a time. The bounded
//! handoff channel plus the two-buffer pool give the double buffering: the
//! producer can be filling the buffer for partition i+1 while the workers
//! are still consuming partition i, and it can never refill a buffer the
//! dispatcher has not handed back.

use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender};

use crate::engine::PartitionSet;

use super::buffer::{LoadedPartition, ScanBuffer};

/// Producer loop: one iteration of the outer loop per scan batch, one
/// loaded partition sent downstream per inner iteration. Exits when either
/// side of the pipeline disconnects.
pub(crate) fn run_producer(
    partitions: Arc<PartitionSet>,
    value_len: usize,
    batch_rx: Receiver<()>,
    free_rx: Receiver<ScanBuffer>,
    loaded_tx: Sender<LoadedPartition>,
) {
    while batch_rx.recv().is_ok() {
        for (id, part) in partitions.iter().enumerate() {
            let Ok(mut buffer) = free_rx.recv() else {
                return;
            };

            // Snapshot the offset arrays first, then bound the prefetch by
            // the log's committed count: every record number in the
            // snapshot was published before its index entry, so the count
            // read here covers them all.
            let snapshot = part.index.offset_arrays();
            let records = part.log.record_count() as usize;

            buffer.ensure_records(records);
            let per_chunk = buffer.records_per_chunk();
            let mut loaded = 0usize;
            let mut chunk = 0usize;
            while loaded < records {
                let n = per_chunk.min(records - loaded);
                let dst = &mut buffer.chunk_mut(chunk)[..n * value_len];
                if let Err(e) = part.log.read_range_into(loaded as u32, n, dst) {
                    // The extent stops at the failed chunk: records past it
                    // would otherwise alias recycled bytes from an earlier
                    // partition. They surface as per-record misses in the
                    // workers; the batch itself keeps going.
                    tracing::error!(partition = id, error = %e, "scan prefetch read failed");
                    break;
                }
                loaded += n;
                chunk += 1;
            }

            let view = LoadedPartition::new(id, snapshot, value_len, loaded, buffer);
            if loaded_tx.send(view).is_err() {
                return;
            }
        }
    }
}
