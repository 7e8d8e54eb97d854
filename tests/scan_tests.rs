//! Scan pipeline tests
//!
//! These tests verify:
//! - Full-keyspace completeness and ordering guarantees
//! - Exactly-once visitation per live key (overwrites collapse)
//! - Batch atomicity with exactly W concurrent callers
//! - Advisory bounds (never filtered by the pipeline)
//! - Multi-chunk prefetch buffers and scans after restart

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use slatekv::{Config, Engine};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn scan_config(dir: &Path, batch_width: usize) -> Config {
    Config::builder()
        .data_dir(dir)
        .partition_count(4)
        .value_len(8)
        .max_records(2048)
        .batch_width(batch_width)
        .scan_chunk_bytes(64) // 8 records per chunk, forces multi-chunk buffers
        .rebuild_threads(2)
        .build()
}

/// A key routed to `partition` (top two bits) with low bits `k`.
fn partitioned_key(partition: u64, k: u64) -> [u8; 8] {
    ((partition << 62) | k).to_be_bytes()
}

/// Collect one full scan into a vector of (key, value) pairs.
fn collect_scan(engine: &Engine) -> Vec<(Vec<u8>, Vec<u8>)> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        engine
            .range(&[], &[], move |key, value| {
                seen.lock().push((key.to_vec(), value.to_vec()));
            })
            .unwrap();
    }
    let pairs = seen.lock().clone();
    pairs
}

// =============================================================================
// Completeness and Ordering
// =============================================================================

#[test]
fn scan_visits_every_record_in_partition_then_insertion_order() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(scan_config(dir.path(), 1)).unwrap();

    // Interleave writes across partitions; the scan must still come back
    // partition-ascending, insertion-ordered within each partition.
    for k in 0..32u64 {
        for p in [2u64, 0, 3, 1] {
            engine
                .write(&partitioned_key(p, k), &(p * 1000 + k).to_be_bytes())
                .unwrap();
        }
    }

    let pairs = collect_scan(&engine);
    assert_eq!(pairs.len(), 128);

    let mut expected = Vec::new();
    for p in 0..4u64 {
        for k in 0..32u64 {
            expected.push((
                partitioned_key(p, k).to_vec(),
                (p * 1000 + k).to_be_bytes().to_vec(),
            ));
        }
    }
    assert_eq!(pairs, expected);
    engine.close();
}

#[test]
fn scan_sees_latest_value_once_per_key() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(scan_config(dir.path(), 1)).unwrap();

    let key = partitioned_key(1, 5);
    engine.write(&key, &111u64.to_be_bytes()).unwrap();
    engine.write(&key, &222u64.to_be_bytes()).unwrap();

    let pairs = collect_scan(&engine);
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].0, key.to_vec());
    assert_eq!(pairs[0].1, 222u64.to_be_bytes().to_vec());
    engine.close();
}

#[test]
fn scan_ignores_advisory_bounds() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(scan_config(dir.path(), 1)).unwrap();

    for k in 0..20u64 {
        engine
            .write(&partitioned_key(0, k), &k.to_be_bytes())
            .unwrap();
    }

    // Bounds that would exclude everything if they were enforced.
    let visits = Arc::new(AtomicUsize::new(0));
    {
        let visits = Arc::clone(&visits);
        engine
            .range(&[0xff; 8], &[0xff; 8], move |_key, _value| {
                visits.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
    }
    assert_eq!(visits.load(Ordering::Relaxed), 20);
    engine.close();
}

#[test]
fn consecutive_batches_reuse_the_pipeline() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(scan_config(dir.path(), 1)).unwrap();

    for k in 0..10u64 {
        engine
            .write(&partitioned_key(2, k), &k.to_be_bytes())
            .unwrap();
    }

    assert_eq!(collect_scan(&engine).len(), 10);

    // Records written between batches show up in the next batch.
    engine
        .write(&partitioned_key(2, 10), &10u64.to_be_bytes())
        .unwrap();
    assert_eq!(collect_scan(&engine).len(), 11);
    engine.close();
}

#[test]
fn scan_after_restart() {
    let dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(scan_config(dir.path(), 1)).unwrap();
        for k in 0..64u64 {
            engine
                .write(&partitioned_key(k % 4, k), &k.to_be_bytes())
                .unwrap();
        }
        engine.close();
    }

    let engine = Engine::open(scan_config(dir.path(), 1)).unwrap();
    assert_eq!(collect_scan(&engine).len(), 64);
    engine.close();
}

// =============================================================================
// Batch Concurrency
// =============================================================================

#[test]
fn batch_of_w_callers_all_observe_the_full_keyspace() {
    const W: usize = 4;

    let dir = TempDir::new().unwrap();
    let engine = Arc::new(Engine::open(scan_config(dir.path(), W)).unwrap());

    for k in 0..100u64 {
        engine
            .write(&partitioned_key(k % 4, k), &k.to_be_bytes())
            .unwrap();
    }

    // A batch only starts once all W callers are pending; each must then
    // observe the identical full scan.
    let mut handles = Vec::new();
    let mut counters = Vec::new();
    for _ in 0..W {
        let engine = Arc::clone(&engine);
        let visits = Arc::new(AtomicUsize::new(0));
        counters.push(Arc::clone(&visits));
        handles.push(thread::spawn(move || {
            engine
                .range(&[], &[], move |_key, _value| {
                    visits.fetch_add(1, Ordering::Relaxed);
                })
                .unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for visits in counters {
        assert_eq!(visits.load(Ordering::Relaxed), 100);
    }

    if let Ok(engine) = Arc::try_unwrap(engine) {
        engine.close();
    }
}
