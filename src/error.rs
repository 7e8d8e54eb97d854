//! Error types for SlateKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using SlateError
pub type Result<T> = std::result::Result<T, SlateError>;

/// Unified error type for SlateKV operations
#[derive(Debug, Error)]
pub enum SlateError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Lookup Outcomes
    // -------------------------------------------------------------------------
    /// A read for a key that was never written. Expected outcome, not a
    /// corruption signal.
    #[error("Key not found")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Contract Violations
    // -------------------------------------------------------------------------
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid value length: expected {expected} bytes, got {actual}")]
    InvalidValueLength { expected: usize, actual: usize },

    /// The partition's pre-allocated region is full. Unrecoverable for the
    /// given configuration; the write fails rather than corrupting
    /// adjacent entries.
    #[error("Partition {partition} capacity exceeded: {capacity} records")]
    CapacityExceeded { partition: usize, capacity: usize },

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Scan Errors
    // -------------------------------------------------------------------------
    /// The blocking wait for a scan batch was abandoned, typically because
    /// the engine shut down with the batch still incomplete.
    #[error("Range scan interrupted before completion")]
    ScanInterrupted,
}
