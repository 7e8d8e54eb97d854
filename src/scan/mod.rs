//! Scan Pipeline
//!
//! Answers many concurrent `range` calls with one full-keyspace pass,
//! amortizing I/O across callers instead of scanning once per caller.
//!
//! ## Responsibilities
//! - Queue incoming range tasks and collect them into batches of width W
//! - Drive a pool of W long-lived workers, one task per worker per batch
//! - Prefetch partition value regions on a producer thread, double-buffered
//!   so I/O for partition i+1 overlaps compute on partition i
//! - Keep all W workers on the same partition buffer via a barrier pair
//!
//! ## Batch Flow
//! ```text
//!  range callers ──▶ task queue ──▶ dispatcher (collects W tasks)
//!                                        │
//!                      ┌─────────────────┼─────────────────┐
//!                      ▼                 ▼                 ▼
//!                  producer         start barrier      W workers
//!               (prefetch next      (per partition)   (walk offset
//!                partition into           │            arrays, call
//!                a recycled buffer)       ▼            visitor)
//!                      ▲             done barrier          │
//!                      └──── buffer ◀─────┴────────────────┘
//!                           recycled
//! ```
//!
//! A batch never starts until W callers are pending; the two barriers
//! guarantee the producer only refills a buffer after every worker has
//! finished reading it.

mod buffer;
mod pipeline;
mod producer;
mod task;

pub(crate) use pipeline::ScanPipeline;
pub(crate) use task::VisitFn;
