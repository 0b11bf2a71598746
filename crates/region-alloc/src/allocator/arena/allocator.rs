//! Main arena (bump) allocator implementation.
//!
//! Allocation advances a single cursor through the region; individual
//! allocations are never freed. The whole region is recycled with `reset`,
//! and the most recent allocation can be grown or shrunk in place.
//!
//! ## Invariants
//!
//! - `0 <= prev_offset <= offset <= capacity`
//! - `prev_offset` is the aligned offset of the most recent successful
//!   allocation; the resize fast path matches against it
//! - returned regions are zero-filled, aligned, and inside the buffer
//! - failed operations leave `offset`/`prev_offset` untouched

use core::alloc::Layout;
use core::cell::Cell;
use core::ptr::NonNull;

use alloc::boxed::Box;

use super::{ArenaCheckpoint, ArenaConfig, ArenaScope};
use crate::allocator::{Allocator, MemoryUsage, Resettable};
use crate::buffer::RegionBuffer;
use crate::error::{AllocError, AllocResult};
use crate::stats::{AllocatorStats, OpCounters, StatisticsProvider};
use crate::utils::{align_up, is_power_of_two};

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

/// Bump allocator over a fixed byte region.
///
/// # Memory Layout
/// ```text
/// [start]----[alloc1]--[pad][alloc2]----[offset]........[end]
///             <------ allocated ------>  <-- available -->
/// ```
///
/// `prev_offset` remembers where the most recent allocation begins so that
/// [`resize_aligned`](Self::resize_aligned) can grow or shrink it without
/// moving.
pub struct ArenaAllocator {
    /// Backing region.
    buffer: RegionBuffer,

    /// Configuration.
    config: ArenaConfig,

    /// Next free byte offset.
    offset: Cell<usize>,

    /// Aligned offset of the most recent successful allocation.
    prev_offset: Cell<usize>,

    /// Bumped on every reset; stale checkpoints are rejected by it.
    generation: Cell<u32>,

    /// Optional statistics.
    counters: OpCounters,
}

impl ArenaAllocator {
    /// Creates an arena with `capacity` bytes and a custom configuration.
    pub fn with_config(capacity: usize, config: ArenaConfig) -> AllocResult<Self> {
        let buffer = RegionBuffer::new_zeroed(capacity)
            .ok_or(AllocError::invalid_layout("capacity cannot be zero"))?;
        Ok(Self::from_parts(buffer, config))
    }

    /// Creates an arena with `capacity` bytes and the default configuration.
    pub fn new(capacity: usize) -> AllocResult<Self> {
        Self::with_config(capacity, ArenaConfig::default())
    }

    /// Creates an arena over a caller-supplied buffer.
    #[must_use]
    pub fn from_boxed_slice(memory: Box<[u8]>) -> Self {
        Self::from_parts(RegionBuffer::from_boxed_slice(memory), ArenaConfig::default())
    }

    fn from_parts(buffer: RegionBuffer, config: ArenaConfig) -> Self {
        #[cfg(feature = "tracing")]
        debug!(capacity = buffer.capacity(), "arena allocator created");

        let track_stats = config.track_stats;
        Self {
            buffer,
            config,
            offset: Cell::new(0),
            prev_offset: Cell::new(0),
            generation: Cell::new(0),
            counters: OpCounters::new(track_stats),
        }
    }

    /// Total capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Bytes currently allocated (including alignment padding).
    #[inline]
    pub fn used(&self) -> usize {
        self.offset.get()
    }

    /// Bytes still available for allocation.
    #[inline]
    pub fn available(&self) -> usize {
        self.capacity() - self.used()
    }

    /// Peak usage observed since construction or the last reset.
    #[inline]
    pub fn peak_usage(&self) -> usize {
        self.counters.peak_usage()
    }

    /// Allocates `size` zeroed bytes aligned to `align`.
    ///
    /// # Errors
    ///
    /// - `InvalidAlignment` if `align` is not a power of two
    /// - `InvalidLayout` for zero-size requests
    /// - `OutOfMemory` if the aligned request does not fit; the arena is
    ///   left unchanged
    pub fn alloc_aligned(&self, size: usize, align: usize) -> AllocResult<NonNull<[u8]>> {
        let aligned_offset = self.try_bump(size, align)?;
        self.counters.record_allocation(self.offset.get());

        // SAFETY: try_bump reserved [aligned_offset, aligned_offset + size)
        // inside the buffer; no other live pointer covers it.
        let ptr = unsafe { self.buffer.at(aligned_offset) };
        // SAFETY: the pointer derives from a live Box allocation.
        let ptr = unsafe { NonNull::new_unchecked(ptr) };
        Ok(NonNull::slice_from_raw_parts(ptr, size))
    }

    /// Grows or shrinks an existing allocation.
    ///
    /// The most recent allocation is resized in place and keeps its
    /// address. Any earlier allocation is moved to a fresh bump allocation
    /// with its first `min(old_size, new_size)` bytes copied over; the old
    /// address stays readable but is no longer tracked.
    ///
    /// Changing the alignment of an allocation is not supported: `align`
    /// must be the alignment the block was allocated with.
    ///
    /// # Safety
    ///
    /// `old_ptr` must point to a live allocation of `old_size` bytes made
    /// by this arena with alignment `align`. If the block moves, the old
    /// pointer must not be written through afterwards.
    ///
    /// # Errors
    ///
    /// - `InvalidAlignment` / `InvalidLayout` for bad parameters
    /// - `OutOfRange` if `old_ptr` is not inside the region
    /// - `OutOfMemory` if the resize does not fit; the arena and the old
    ///   allocation are left unchanged
    pub unsafe fn resize_aligned(
        &self,
        old_ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
        align: usize,
    ) -> AllocResult<NonNull<[u8]>> {
        if !is_power_of_two(align) {
            return Err(AllocError::invalid_alignment(align));
        }
        if old_size == 0 {
            return Err(AllocError::invalid_layout("zero-size source block"));
        }

        let addr = old_ptr.as_ptr() as usize;
        let Some(block_offset) = self.buffer.offset_of(addr) else {
            return Err(AllocError::out_of_range(addr));
        };

        // Most-recent fast path: move the cursor, keep the address.
        if block_offset == self.prev_offset.get() {
            let new_end = block_offset
                .checked_add(new_size)
                .ok_or(AllocError::size_overflow("resized block end"))?;
            if new_end > self.capacity() {
                self.counters.record_failure();
                return Err(AllocError::out_of_memory(new_size, align, self.available()));
            }

            if new_size > old_size {
                // SAFETY: the revealed tail lies inside the buffer and is
                // not covered by any other allocation.
                unsafe { self.buffer.zero(block_offset + old_size, new_size - old_size) };
            }
            self.offset.set(new_end);
            self.counters.record_reallocation(new_end);
            return Ok(NonNull::slice_from_raw_parts(old_ptr, new_size));
        }

        // Earlier allocation: move it to a fresh bump allocation.
        let new_offset = self.try_bump(new_size, align)?;
        let copy_len = old_size.min(new_size);
        // SAFETY: source and destination both lie inside the buffer;
        // ptr::copy tolerates overlap.
        unsafe {
            core::ptr::copy(old_ptr.as_ptr(), self.buffer.at(new_offset), copy_len);
        }
        self.counters.record_reallocation(self.offset.get());

        // SAFETY: pointer derives from a live Box allocation.
        let ptr = unsafe { NonNull::new_unchecked(self.buffer.at(new_offset)) };
        Ok(NonNull::slice_from_raw_parts(ptr, new_size))
    }

    /// Releases every allocation at once.
    ///
    /// # Safety
    ///
    /// Invalidates every pointer previously returned by this arena.
    pub unsafe fn reset(&self) {
        #[cfg(feature = "tracing")]
        trace!(released = self.offset.get(), "arena reset");

        if let Some(pattern) = self.config.dealloc_pattern {
            // SAFETY: the released prefix is inside the buffer and the
            // caller guarantees no pointers into it survive this call.
            unsafe { self.buffer.fill(0, self.offset.get(), pattern) };
        }
        self.offset.set(0);
        self.prev_offset.set(0);
        self.generation.set(self.generation.get().wrapping_add(1));
        self.counters.reset();
    }

    /// Captures the current position for a later [`restore`](Self::restore).
    #[must_use = "a checkpoint is only useful if restored later"]
    pub fn checkpoint(&self) -> ArenaCheckpoint {
        ArenaCheckpoint {
            offset: self.offset.get(),
            prev_offset: self.prev_offset.get(),
            generation: self.generation.get(),
        }
    }

    /// Restores a previously captured position, releasing everything
    /// allocated after it.
    ///
    /// # Safety
    ///
    /// Invalidates every pointer handed out after the checkpoint was taken.
    ///
    /// # Errors
    ///
    /// `InvalidLayout` if the checkpoint is from a different generation
    /// (a `reset` happened in between) or lies past the current position.
    pub unsafe fn restore(&self, checkpoint: ArenaCheckpoint) -> AllocResult<()> {
        if checkpoint.generation != self.generation.get() {
            return Err(AllocError::invalid_layout("checkpoint from a different generation"));
        }
        if checkpoint.offset > self.offset.get() {
            return Err(AllocError::invalid_layout("checkpoint is in the future"));
        }

        if let Some(pattern) = self.config.dealloc_pattern {
            let released = self.offset.get() - checkpoint.offset;
            // SAFETY: the released range is inside the buffer; the caller
            // guarantees no pointers into it survive this call.
            unsafe { self.buffer.fill(checkpoint.offset, released, pattern) };
        }
        self.offset.set(checkpoint.offset);
        self.prev_offset.set(checkpoint.prev_offset);
        Ok(())
    }

    /// Opens an RAII scope that restores the current position on drop.
    pub fn scoped(&self) -> ArenaScope<'_> {
        ArenaScope::new(self)
    }

    /// Reserves `[aligned, aligned + size)` and zeroes it. Shared by
    /// allocation and the moving resize path; does not touch statistics.
    fn try_bump(&self, size: usize, align: usize) -> AllocResult<usize> {
        if !is_power_of_two(align) {
            return Err(AllocError::invalid_alignment(align));
        }
        if size == 0 {
            return Err(AllocError::invalid_layout("zero-size allocation"));
        }

        let base = self.buffer.start_addr() + self.offset.get();
        let aligned_offset = align_up(base, align) - self.buffer.start_addr();
        let new_offset = aligned_offset
            .checked_add(size)
            .ok_or(AllocError::size_overflow("allocation end offset"))?;

        if new_offset > self.capacity() {
            self.counters.record_failure();
            #[cfg(feature = "tracing")]
            trace!(size, align, available = self.available(), "arena allocation failed");
            return Err(AllocError::out_of_memory(size, align, self.available()));
        }

        self.prev_offset.set(aligned_offset);
        self.offset.set(new_offset);
        // SAFETY: the reserved range is inside the buffer and disjoint from
        // every earlier allocation.
        unsafe { self.buffer.zero(aligned_offset, size) };
        Ok(aligned_offset)
    }
}

// SAFETY: allocate hands out aligned, zeroed, non-overlapping ranges of the
// owned buffer; deallocate is the documented bump-allocator no-op.
unsafe impl Allocator for ArenaAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        self.alloc_aligned(layout.size(), layout.align())
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {
        // Bump allocation has no individual free; space returns on reset.
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        if old_layout.align() != new_layout.align() {
            return Err(AllocError::invalid_layout("alignment change is not supported"));
        }
        // SAFETY: forwarded caller contract.
        unsafe {
            self.resize_aligned(ptr, old_layout.size(), new_layout.size(), new_layout.align())
        }
    }
}

impl MemoryUsage for ArenaAllocator {
    fn used_memory(&self) -> usize {
        self.used()
    }

    fn available_memory(&self) -> Option<usize> {
        Some(self.available())
    }

    fn total_memory(&self) -> Option<usize> {
        Some(self.capacity())
    }
}

impl Resettable for ArenaAllocator {
    unsafe fn reset(&self) {
        // SAFETY: forwarded caller contract.
        unsafe { ArenaAllocator::reset(self) }
    }
}

impl StatisticsProvider for ArenaAllocator {
    fn statistics(&self) -> AllocatorStats {
        self.counters.snapshot(self.used())
    }

    fn reset_statistics(&self) {
        self.counters.reset();
    }

    fn statistics_enabled(&self) -> bool {
        self.counters.enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(capacity: usize) -> ArenaAllocator {
        ArenaAllocator::with_config(capacity, ArenaConfig::production())
            .expect("failed to create arena")
    }

    #[test]
    fn test_prev_offset_tracks_aligned_start() {
        let a = arena(64);
        let p = a.alloc_aligned(4, 1).unwrap();
        let q = a.alloc_aligned(8, 8).unwrap();
        // first allocation is at offset 0, so its address is the region base
        let base = p.cast::<u8>().as_ptr() as usize;
        let q_addr = q.cast::<u8>().as_ptr() as usize;
        assert_eq!(q_addr % 8, 0);
        assert_eq!(a.prev_offset.get(), q_addr - base);
        assert!(a.prev_offset.get() <= a.offset.get());
    }

    #[test]
    fn test_failed_alloc_leaves_state() {
        let a = arena(16);
        a.alloc_aligned(8, 8).unwrap();
        let offset = a.offset.get();
        let prev = a.prev_offset.get();
        assert!(a.alloc_aligned(64, 8).is_err());
        assert_eq!(a.offset.get(), offset);
        assert_eq!(a.prev_offset.get(), prev);
    }

    #[test]
    fn test_reset_clears_cursor_and_generation_guard() {
        let a = arena(64);
        let cp = a.checkpoint();
        a.alloc_aligned(16, 8).unwrap();
        unsafe { a.reset() };
        assert_eq!(a.used(), 0);
        assert_eq!(a.prev_offset.get(), 0);
        assert!(unsafe { a.restore(cp) }.is_err());
    }
}
