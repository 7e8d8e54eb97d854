//! Dispatcher, worker pool, and the pipeline front door
//!
//! The dispatcher collects exactly W pending range tasks, hands one to
//! each of the W pooled workers, and then walks every partition in
//! ascending order behind a barrier pair: the start barrier releases all W
//! workers onto the freshly published partition buffer at once, the done
//! barrier holds the buffer until every worker has finished reading it.
//! Only then is the buffer recycled to the producer — no worker ever reads
//! bytes the producer is concurrently overwriting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::engine::PartitionSet;
use crate::error::{Result, SlateError};

use super::buffer::{LoadedPartition, ScanBuffer};
use super::producer::run_producer;
use super::task::{RangeTask, VisitFn};

/// Buffers rotating between producer and dispatcher.
const SCAN_BUFFERS: usize = 2;

/// State shared between the dispatcher and its W workers for the lifetime
/// of the pipeline.
struct ScanShared {
    /// The partition currently being scanned; populated by the dispatcher
    /// before the start barrier, taken back after the done barrier.
    current: RwLock<Option<Arc<LoadedPartition>>>,
    /// W workers + the dispatcher.
    start: Barrier,
    done: Barrier,
    partition_count: usize,
    value_len: usize,
}

#[derive(Debug, Clone, Copy)]
struct DispatcherConfig {
    batch_width: usize,
    value_len: usize,
    chunk_bytes: usize,
}

/// Front door for `range` calls: queue a task, block on its completion.
#[derive(Debug)]
pub(crate) struct ScanPipeline {
    tasks_tx: Mutex<Option<Sender<RangeTask>>>,
    tasks_rx: Mutex<Option<Receiver<RangeTask>>>,
    started: AtomicBool,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    partitions: Arc<PartitionSet>,
    cfg: DispatcherConfig,
}

impl ScanPipeline {
    pub fn new(
        partitions: Arc<PartitionSet>,
        batch_width: usize,
        value_len: usize,
        chunk_bytes: usize,
    ) -> Self {
        let (tasks_tx, tasks_rx) = unbounded();
        Self {
            tasks_tx: Mutex::new(Some(tasks_tx)),
            tasks_rx: Mutex::new(Some(tasks_rx)),
            started: AtomicBool::new(false),
            dispatcher: Mutex::new(None),
            partitions,
            cfg: DispatcherConfig {
                batch_width,
                value_len,
                chunk_bytes,
            },
        }
    }

    /// Enqueue one range task and block until its batch has scanned the
    /// full keyspace. The dispatcher (and with it the worker pool and the
    /// producer) starts lazily on the first call.
    ///
    /// A batch only starts once `batch_width` callers are pending, so with
    /// fewer concurrent callers this blocks until the rest arrive.
    pub fn execute(&self, visitor: VisitFn) -> Result<()> {
        self.ensure_started()?;

        let (done_tx, done_rx) = bounded(1);
        let task = RangeTask {
            visitor,
            done: done_tx,
        };
        let Some(tx) = self.tasks_tx.lock().clone() else {
            return Err(SlateError::ScanInterrupted);
        };
        if tx.send(task).is_err() {
            return Err(SlateError::ScanInterrupted);
        }
        // The engine-held sender must be the only thing keeping the queue
        // alive: holding this clone across the blocking recv below would
        // stop the dispatcher from ever observing shutdown while a
        // partially collected batch has callers parked here.
        drop(tx);

        done_rx.recv().map_err(|_| {
            tracing::warn!("range call abandoned: scan batch did not complete");
            SlateError::ScanInterrupted
        })
    }

    /// Spawn the dispatcher on the first range call. Double-checked so
    /// every later call is one atomic load.
    fn ensure_started(&self) -> Result<()> {
        if self.started.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut dispatcher = self.dispatcher.lock();
        if self.started.load(Ordering::Acquire) {
            return Ok(());
        }

        let Some(tasks_rx) = self.tasks_rx.lock().take() else {
            return Err(SlateError::ScanInterrupted);
        };
        let partitions = Arc::clone(&self.partitions);
        let cfg = self.cfg;
        let handle = thread::Builder::new()
            .name("slatekv-scan-dispatch".to_string())
            .spawn(move || run_dispatcher(partitions, cfg, tasks_rx))?;
        *dispatcher = Some(handle);
        self.started.store(true, Ordering::Release);
        tracing::info!(batch_width = cfg.batch_width, "scan pipeline started");
        Ok(())
    }

    /// Drop the task queue and join the dispatcher. Tasks collected into a
    /// partial batch are dropped, which wakes their callers with an error.
    pub fn shutdown(&self) {
        *self.tasks_tx.lock() = None;
        if let Some(handle) = self.dispatcher.lock().take() {
            if handle.join().is_err() {
                tracing::error!("scan dispatcher panicked during shutdown");
            }
        }
    }
}

fn run_dispatcher(
    partitions: Arc<PartitionSet>,
    cfg: DispatcherConfig,
    tasks_rx: Receiver<RangeTask>,
) {
    let width = cfg.batch_width;
    let shared = Arc::new(ScanShared {
        current: RwLock::new(None),
        start: Barrier::new(width + 1),
        done: Barrier::new(width + 1),
        partition_count: partitions.len(),
        value_len: cfg.value_len,
    });

    // Worker pool, one long-lived thread per batch slot.
    let mut job_txs = Vec::with_capacity(width);
    let mut workers = Vec::with_capacity(width);
    for i in 0..width {
        let (job_tx, job_rx) = bounded::<RangeTask>(1);
        let shared = Arc::clone(&shared);
        match thread::Builder::new()
            .name(format!("slatekv-scan-{i}"))
            .spawn(move || run_worker(shared, job_rx))
        {
            Ok(handle) => {
                job_txs.push(job_tx);
                workers.push(handle);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn scan worker");
                return;
            }
        }
    }

    // Producer plus the two-buffer pool it draws from.
    let (batch_tx, batch_rx) = bounded::<()>(1);
    let (loaded_tx, loaded_rx) = bounded::<LoadedPartition>(1);
    let (free_tx, free_rx) = bounded::<ScanBuffer>(SCAN_BUFFERS);
    for _ in 0..SCAN_BUFFERS {
        let _ = free_tx.send(ScanBuffer::new(cfg.value_len, cfg.chunk_bytes));
    }
    let producer = {
        let partitions = Arc::clone(&partitions);
        let value_len = cfg.value_len;
        thread::Builder::new()
            .name("slatekv-scan-fetch".to_string())
            .spawn(move || run_producer(partitions, value_len, batch_rx, free_rx, loaded_tx))
    };
    let producer = match producer {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "failed to spawn scan producer");
            return;
        }
    };

    let mut batch_no = 0u64;
    'batches: loop {
        // Collect exactly W tasks; a partial batch at shutdown is dropped,
        // unparking its callers with an error.
        let mut tasks = Vec::with_capacity(width);
        for _ in 0..width {
            match tasks_rx.recv() {
                Ok(task) => tasks.push(task),
                Err(_) => break 'batches,
            }
        }

        let started_at = Instant::now();
        if batch_tx.send(()).is_err() {
            tracing::error!("scan producer exited; abandoning batch");
            return;
        }
        for (job_tx, task) in job_txs.iter().zip(tasks) {
            if job_tx.send(task).is_err() {
                tracing::error!("scan worker exited; abandoning batch");
                return;
            }
        }

        for _ in 0..shared.partition_count {
            let loaded = match loaded_rx.recv() {
                Ok(loaded) => loaded,
                Err(_) => {
                    tracing::error!("scan producer exited mid-batch");
                    return;
                }
            };
            *shared.current.write() = Some(Arc::new(loaded));
            shared.start.wait();
            shared.done.wait();
            // Every worker dropped its reference before the done barrier,
            // so the buffer can be recycled to the producer.
            if let Some(view) = shared.current.write().take() {
                match Arc::try_unwrap(view) {
                    Ok(view) => {
                        let _ = free_tx.send(view.into_buffer());
                    }
                    Err(_) => tracing::error!("scan buffer still referenced after done barrier"),
                }
            }
        }

        batch_no += 1;
        tracing::info!(
            batch = batch_no,
            tasks = width,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "full keyspace scan batch complete"
        );
    }

    // Clean shutdown: disconnect the pool and the producer, then join.
    drop(job_txs);
    drop(batch_tx);
    for handle in workers {
        if handle.join().is_err() {
            tracing::error!("scan worker panicked");
        }
    }
    if producer.join().is_err() {
        tracing::error!("scan producer panicked");
    }
}

/// Worker loop: one task per batch, bound 1:1 to that task's visitor.
///
/// Every worker walks the same published partition in the same snapshot
/// order, so all W visitors observe identical (key, value) sequences. A
/// record that cannot be sliced out of the buffer is logged and skipped;
/// it never aborts the batch for the other callers.
fn run_worker(shared: Arc<ScanShared>, job_rx: Receiver<RangeTask>) {
    let mut scratch = vec![0u8; shared.value_len];
    while let Ok(mut task) = job_rx.recv() {
        for _ in 0..shared.partition_count {
            shared.start.wait();
            let view = shared.current.read().clone();
            if let Some(view) = view {
                for j in 0..view.snapshot.len() {
                    let record_no = view.snapshot.record_nos[j];
                    match view.value(record_no) {
                        Some(bytes) => {
                            scratch.copy_from_slice(bytes);
                            let key = view.snapshot.keys[j].to_be_bytes();
                            (task.visitor)(&key, &scratch);
                        }
                        None => {
                            tracing::error!(
                                partition = view.partition,
                                record = record_no,
                                "record missing from prefetched buffer; skipping"
                            );
                        }
                    }
                }
                // The reference must die before the done barrier so the
                // dispatcher can reclaim the buffer.
                drop(view);
            }
            shared.done.wait();
        }
        let _ = task.done.send(());
    }
}
