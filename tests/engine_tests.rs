//! Engine integration tests
//!
//! These tests verify:
//! - Write/read round-trips across partitions
//! - Not-found and width-validation contracts
//! - Overwrite semantics (latest value wins, old record orphaned)
//! - Restart durability via index rebuild
//! - Capacity enforcement

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use slatekv::{Config, Engine, SlateError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(dir: &Path) -> Config {
    Config::builder()
        .data_dir(dir)
        .partition_count(4)
        .value_len(8)
        .max_records(2048)
        .batch_width(1)
        .scan_chunk_bytes(64)
        .rebuild_threads(2)
        .build()
}

/// Keys that actually spread across partitions: the partitioner routes on
/// the high bits of the big-endian key.
fn spread_key(k: u64) -> [u8; 8] {
    k.wrapping_mul(0x9E37_79B9_7F4A_7C15).to_be_bytes()
}

// =============================================================================
// Round-trip and Lookup Tests
// =============================================================================

#[test]
fn round_trip_across_partitions() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(test_config(dir.path())).unwrap();

    for k in 0..500u64 {
        engine.write(&spread_key(k), &k.to_be_bytes()).unwrap();
    }
    for k in 0..500u64 {
        assert_eq!(engine.read(&spread_key(k)).unwrap(), k.to_be_bytes());
    }
    assert_eq!(engine.key_count(), 500);
    engine.close();
}

#[test]
fn read_missing_key_is_not_found() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(test_config(dir.path())).unwrap();

    engine.write(&spread_key(1), &1u64.to_be_bytes()).unwrap();
    assert!(matches!(
        engine.read(&spread_key(2)).unwrap_err(),
        SlateError::KeyNotFound
    ));
    engine.close();
}

#[test]
fn rejects_bad_key_and_value_widths() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(test_config(dir.path())).unwrap();

    assert!(matches!(
        engine.write(b"abc", &0u64.to_be_bytes()).unwrap_err(),
        SlateError::InvalidKeyLength { .. }
    ));
    assert!(matches!(
        engine.write(&spread_key(1), b"toolongvalue").unwrap_err(),
        SlateError::InvalidValueLength { .. }
    ));
    assert!(matches!(
        engine.read(&[0u8; 3]).unwrap_err(),
        SlateError::InvalidKeyLength { .. }
    ));
    engine.close();
}

#[test]
fn overwrite_returns_latest_value_and_orphans_old_record() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(test_config(dir.path())).unwrap();

    let key = spread_key(77);
    engine.write(&key, &1u64.to_be_bytes()).unwrap();
    engine.write(&key, &2u64.to_be_bytes()).unwrap();

    assert_eq!(engine.read(&key).unwrap(), 2u64.to_be_bytes());
    // Both records are physically present; only one key is live.
    assert_eq!(engine.record_count(), 2);
    assert_eq!(engine.key_count(), 1);
    engine.close();
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn restart_durability_via_rebuild() {
    let dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(test_config(dir.path())).unwrap();
        for k in 0..200u64 {
            engine.write(&spread_key(k), &k.to_be_bytes()).unwrap();
        }
        engine.close();
    }

    let engine = Engine::open(test_config(dir.path())).unwrap();
    assert_eq!(engine.key_count(), 200);
    for k in 0..200u64 {
        assert_eq!(engine.read(&spread_key(k)).unwrap(), k.to_be_bytes());
    }
    engine.close();
}

#[test]
fn reopen_keeps_appending_after_rebuild() {
    let dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(test_config(dir.path())).unwrap();
        for k in 0..50u64 {
            engine.write(&spread_key(k), &k.to_be_bytes()).unwrap();
        }
        engine.close();
    }

    let engine = Engine::open(test_config(dir.path())).unwrap();
    for k in 50..100u64 {
        engine.write(&spread_key(k), &k.to_be_bytes()).unwrap();
    }
    for k in 0..100u64 {
        assert_eq!(engine.read(&spread_key(k)).unwrap(), k.to_be_bytes());
    }
    engine.close();
}

#[test]
fn capacity_exceeded_fails_write() {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(dir.path())
        .partition_count(1)
        .value_len(8)
        .max_records(3)
        .batch_width(1)
        .rebuild_threads(1)
        .build();
    let engine = Engine::open(config).unwrap();

    for k in 0..3u64 {
        engine.write(&k.to_be_bytes(), &k.to_be_bytes()).unwrap();
    }
    assert!(matches!(
        engine
            .write(&9u64.to_be_bytes(), &9u64.to_be_bytes())
            .unwrap_err(),
        SlateError::CapacityExceeded { partition: 0, .. }
    ));
    engine.close();
}

#[test]
fn invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(dir.path())
        .partition_count(3) // not a power of two
        .build();
    assert!(matches!(
        Engine::open(config).unwrap_err(),
        SlateError::Config(_)
    ));
}

#[test]
fn max_records_beyond_record_number_range_is_rejected() {
    let dir = TempDir::new().unwrap();
    // Record numbers are 4-byte; a capacity past u32::MAX would truncate
    // them. Rejected before any region is allocated.
    let config = Config::builder()
        .data_dir(dir.path())
        .max_records(u32::MAX as usize + 1)
        .build();
    assert!(matches!(
        Engine::open(config).unwrap_err(),
        SlateError::Config(_)
    ));
}

// =============================================================================
// Concrete Scenario
// =============================================================================

#[test]
fn thousand_key_round_trip_and_full_scan() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(test_config(dir.path())).unwrap();

    for k in 1..=1000u64 {
        engine.write(&k.to_be_bytes(), &k.to_be_bytes()).unwrap();
    }
    for k in 1..=1000u64 {
        assert_eq!(engine.read(&k.to_be_bytes()).unwrap(), k.to_be_bytes());
    }

    let visits = Arc::new(AtomicUsize::new(0));
    let mismatches = Arc::new(Mutex::new(Vec::new()));
    {
        let visits = Arc::clone(&visits);
        let mismatches = Arc::clone(&mismatches);
        engine
            .range(&[0u8; 8], &[0xff; 8], move |key, value| {
                visits.fetch_add(1, Ordering::Relaxed);
                if key != value {
                    mismatches.lock().push(key.to_vec());
                }
            })
            .unwrap();
    }

    assert_eq!(visits.load(Ordering::Relaxed), 1000);
    assert!(mismatches.lock().is_empty());
    engine.close();
}
