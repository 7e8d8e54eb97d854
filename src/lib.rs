//! # SlateKV
//!
//! An embedded key-value storage engine for fixed-length records with:
//! - Partitioned, append-only, memory-mapped value logs
//! - A persisted + in-memory hash index from key to record number
//! - Lock-free point reads, single-writer-per-partition appends
//! - A batched, double-buffered, multi-threaded full-keyspace scan pipeline
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Engine                                │
//! │            (partition router + lifecycle)                    │
//! └───────┬───────────────────────┬─────────────────────┬───────┘
//!         │ write / read          │                     │ range
//!         ▼                       │                     ▼
//!  ┌─────────────┐                │            ┌─────────────────┐
//!  │ Partitioner │                │            │  Scan Pipeline  │
//!  │ (high bits) │                │            │ (W-wide batches)│
//!  └──────┬──────┘                │            └────────┬────────┘
//!         │                       ▼                     │
//!         │           ┌───────────────────────┐         │
//!         └──────────▶│ Partition 0..N        │◀────────┘
//!                     │ ┌──────────┐ ┌──────┐ │
//!                     │ │ ValueLog │ │Offset│ │
//!                     │ │  (mmap)  │ │Index │ │
//!                     │ └──────────┘ └──────┘ │
//!                     └───────────────────────┘
//! ```
//!
//! Keys are 8-byte big-endian integers; values are fixed-length byte
//! records whose width is set once per engine. `range` performs an
//! unconditional full-keyspace scan shared by a whole batch of callers;
//! the supplied bounds are advisory and filtering belongs to the visitor.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod partition;
pub mod log;
pub mod index;
pub mod engine;

mod region;
mod scan;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, SlateError};
pub use config::{Config, ConfigBuilder};
pub use engine::Engine;

// =============================================================================
// Engine-wide Constants
// =============================================================================

/// Width of every key, in bytes.
pub const KEY_LEN: usize = 8;

/// Persisted width of one offset-index entry: key (8) + record number (4).
pub const INDEX_ENTRY_LEN: usize = KEY_LEN + 4;

/// Current version of SlateKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
