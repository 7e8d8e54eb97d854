//! Range tasks
//!
//! One queued `range` call: the caller's visitor plus the completion
//! signal the caller blocks on.

use crossbeam::channel::Sender;

/// Visitor capability invoked once per record: `visit(key, value)`.
/// Keys arrive as 8-byte big-endian arrays, values as `value_len` bytes.
pub(crate) type VisitFn = Box<dyn FnMut(&[u8], &[u8]) + Send>;

/// Ephemeral pairing of a visitor and its completion signal; lives for
/// exactly one scan batch. Dropping the task unparks its caller with an
/// error, so an abandoned batch never leaves callers blocked forever.
pub(crate) struct RangeTask {
    pub visitor: VisitFn,
    pub done: Sender<()>,
}
