//! Shared memory-mapped region
//!
//! Both per-partition files are fixed-size memory-mapped regions written by
//! exactly one appender (serialized by the engine's partition lock) and read
//! concurrently without that lock. Rust's aliasing rules disallow handing
//! out `&mut` into a map that readers hold `&` into, so the map lives in an
//! `UnsafeCell` and the writer goes through raw pointers. Safety rests on
//! the commit protocol: the single appender only ever writes bytes past the
//! published watermark, and readers only ever read bytes below it. The
//! watermark itself is an `AtomicU64` inside the mapping (release store on
//! append, acquire load on read), which orders the record bytes before
//! their visibility.

use std::cell::UnsafeCell;
use std::fs::File;
use std::io;
use std::ptr;
use std::sync::atomic::AtomicU64;

use memmap2::MmapMut;

/// Fixed-size mapped region with single-appender / multi-reader access.
#[derive(Debug)]
pub(crate) struct Region {
    map: UnsafeCell<MmapMut>,
}

// Access discipline is documented on the struct: one appender at a time,
// readers stay below the published watermark.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Map the whole of `file`. The file must already be sized to the
    /// region's full capacity.
    pub fn map(file: &File) -> io::Result<Self> {
        // Safety: the engine owns the backing file for its lifetime and
        // nothing else truncates it while mapped.
        let map = unsafe { MmapMut::map_mut(file)? };
        Ok(Self {
            map: UnsafeCell::new(map),
        })
    }

    pub fn len(&self) -> usize {
        // Safety: the mapping itself is never replaced after construction;
        // only its bytes change.
        unsafe { (&*self.map.get()).len() }
    }

    fn base(&self) -> *mut u8 {
        unsafe { (&mut *self.map.get()).as_mut_ptr() }
    }

    /// Copy `src` into the region at `offset`.
    ///
    /// # Safety
    /// The caller must be the region's only appender and the target range
    /// must be at or above the published watermark (no reader can touch it).
    pub unsafe fn write(&self, offset: usize, src: &[u8]) {
        debug_assert!(offset + src.len() <= self.len());
        ptr::copy_nonoverlapping(src.as_ptr(), self.base().add(offset), src.len());
    }

    /// Copy region bytes at `offset` into `dst`. The caller must have
    /// bounds-checked the range against the published watermark.
    pub fn read_into(&self, offset: usize, dst: &mut [u8]) {
        assert!(offset + dst.len() <= self.len(), "region read out of range");
        // Safety: in-bounds, and the commit protocol keeps this range
        // disjoint from any concurrent append.
        unsafe {
            ptr::copy_nonoverlapping(self.base().add(offset), dst.as_mut_ptr(), dst.len());
        }
    }

    /// View eight region bytes at `offset` as an atomic counter.
    /// `offset` must be 8-byte aligned (the mapping is page-aligned).
    pub fn atomic_u64(&self, offset: usize) -> &AtomicU64 {
        debug_assert!(offset % 8 == 0);
        debug_assert!(offset + 8 <= self.len());
        // Safety: alignment checked above, lifetime tied to &self, and all
        // access to these bytes goes through this atomic view.
        unsafe { &*(self.base().add(offset) as *const AtomicU64) }
    }

    /// Flush dirty pages back to the file.
    pub fn flush(&self) -> io::Result<()> {
        unsafe { (&*self.map.get()).flush() }
    }
}
