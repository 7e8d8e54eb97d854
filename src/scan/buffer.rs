//! Scan buffers
//!
//! A recycled, chunked copy of one partition's committed value region plus
//! the offset-array snapshot the workers walk against it. Two of these
//! rotate between the producer and the dispatcher for the lifetime of the
//! pipeline.

use crate::index::OffsetSnapshot;

/// Chunked byte buffer sized for whole value records. Chunks are allocated
/// once and grown lazily; record `r` lives at chunk `r / records_per_chunk`,
/// intra-chunk offset `(r % records_per_chunk) * value_len`.
pub(crate) struct ScanBuffer {
    chunks: Vec<Box<[u8]>>,
    chunk_len: usize,
    records_per_chunk: usize,
}

impl ScanBuffer {
    pub fn new(value_len: usize, chunk_bytes: usize) -> Self {
        // A chunk always holds at least one whole record.
        let records_per_chunk = (chunk_bytes / value_len).max(1);
        Self {
            chunks: Vec::new(),
            chunk_len: records_per_chunk * value_len,
            records_per_chunk,
        }
    }

    pub fn records_per_chunk(&self) -> usize {
        self.records_per_chunk
    }

    /// Grow the chunk list until it can hold `records` records. Existing
    /// chunks are reused as-is; stale bytes past the loaded range are
    /// unreachable because workers only index records below the snapshot's
    /// committed count.
    pub fn ensure_records(&mut self, records: usize) {
        let needed = records.div_ceil(self.records_per_chunk);
        while self.chunks.len() < needed {
            self.chunks.push(vec![0u8; self.chunk_len].into_boxed_slice());
        }
    }

    pub fn chunk_mut(&mut self, chunk: usize) -> &mut [u8] {
        &mut self.chunks[chunk]
    }

    fn value(&self, record_no: u32, value_len: usize) -> Option<&[u8]> {
        let r = record_no as usize;
        let chunk = self.chunks.get(r / self.records_per_chunk)?;
        let offset = (r % self.records_per_chunk) * value_len;
        chunk.get(offset..offset + value_len)
    }
}

/// One partition's prefetched state, published to all W workers for the
/// duration of one barrier window.
pub(crate) struct LoadedPartition {
    pub partition: usize,
    pub snapshot: OffsetSnapshot,
    pub value_len: usize,
    /// Records actually prefetched. The buffer is recycled, so bytes past
    /// this extent belong to whatever partition used it last.
    loaded: usize,
    buffer: ScanBuffer,
}

impl LoadedPartition {
    pub fn new(
        partition: usize,
        snapshot: OffsetSnapshot,
        value_len: usize,
        loaded: usize,
        buffer: ScanBuffer,
    ) -> Self {
        Self {
            partition,
            snapshot,
            value_len,
            loaded,
            buffer,
        }
    }

    /// Read-only view of one record's bytes, `None` if the record falls
    /// outside the prefetched extent.
    pub fn value(&self, record_no: u32) -> Option<&[u8]> {
        if record_no as usize >= self.loaded {
            return None;
        }
        self.buffer.value(record_no, self.value_len)
    }

    /// Reclaim the buffer for the producer once no worker references remain.
    pub fn into_buffer(self) -> ScanBuffer {
        self.buffer
    }
}
