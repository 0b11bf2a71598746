//! Main stack allocator implementation.
//!
//! A LIFO allocator: blocks may be freed individually, but only in strict
//! reverse allocation order. Every live block carries a [`BlockHeader`] in
//! the alignment padding immediately before it, and the headers form a
//! doubly linked list in allocation order.
//!
//! ## Invariants
//!
//! - `0 <= prev_offset <= offset <= capacity`
//! - for a live block at user offset `u`, its header occupies
//!   `[u - HEADER_SIZE, u)` inside that block's padding
//! - the header list is ordered by allocation; the head has no `prev_block`
//!   link and the tail (the top block) has no `next_block` link
//! - `prev_offset` equals the `prev_offset` field of the top header, or 0
//!   when the stack is empty
//! - a non-top resize retires the old block: its data moves to a fresh top
//!   allocation, its padding is folded into the following header, and its
//!   cleared links mark it so a second resize of the stale address fails
//! - failed operations leave all state untouched

use core::alloc::Layout;
use core::cell::Cell;
use core::ptr::{self, NonNull};

use alloc::boxed::Box;

use super::{BlockHeader, StackConfig, StackMarker, HEADER_SIZE, MAX_ALIGN, NO_BLOCK};
use crate::allocator::{Allocator, MemoryUsage, Resettable};
use crate::buffer::RegionBuffer;
use crate::error::{AllocError, AllocResult};
use crate::stats::{AllocatorStats, OpCounters, StatisticsProvider};
use crate::utils::{is_power_of_two, padding_with_header};

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

/// Stack allocator that supports LIFO allocation and deallocation.
///
/// More flexible than an arena but still O(1): individual blocks can be
/// freed, as long as frees happen in reverse allocation order.
///
/// # Memory Layout
/// ```text
/// [start]--[pad|hdr][block1]--[pad|hdr][block2]--[offset]....[end]
///           <-------- allocated -------->         <- available ->
/// ```
///
/// Each header records the padding its block consumed and the cursor value
/// from before the block existed, which is exactly what `free` needs to
/// walk the cursor back.
pub struct StackAllocator {
    /// Backing region.
    buffer: RegionBuffer,

    /// Configuration.
    config: StackConfig,

    /// Next free byte offset.
    offset: Cell<usize>,

    /// Cursor value from just before the top block was allocated.
    prev_offset: Cell<usize>,

    /// User offset of the top (most recent live) block, or [`NO_BLOCK`].
    top_block: Cell<usize>,

    /// Optional statistics.
    counters: OpCounters,
}

impl StackAllocator {
    /// Creates a stack allocator with `capacity` bytes and a custom
    /// configuration.
    pub fn with_config(capacity: usize, config: StackConfig) -> AllocResult<Self> {
        let buffer = RegionBuffer::new_zeroed(capacity)
            .ok_or(AllocError::invalid_layout("capacity cannot be zero"))?;
        Ok(Self::from_parts(buffer, config))
    }

    /// Creates a stack allocator with the default configuration.
    pub fn new(capacity: usize) -> AllocResult<Self> {
        Self::with_config(capacity, StackConfig::default())
    }

    /// Creates a stack allocator over a caller-supplied buffer.
    #[must_use]
    pub fn from_boxed_slice(memory: Box<[u8]>) -> Self {
        Self::from_parts(RegionBuffer::from_boxed_slice(memory), StackConfig::default())
    }

    fn from_parts(buffer: RegionBuffer, config: StackConfig) -> Self {
        #[cfg(feature = "tracing")]
        debug!(capacity = buffer.capacity(), "stack allocator created");

        let track_stats = config.track_stats;
        Self {
            buffer,
            config,
            offset: Cell::new(0),
            prev_offset: Cell::new(0),
            top_block: Cell::new(NO_BLOCK),
            counters: OpCounters::new(track_stats),
        }
    }

    /// Total capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Bytes currently allocated (headers and padding included).
    #[inline]
    pub fn used(&self) -> usize {
        self.offset.get()
    }

    /// Bytes still available for allocation.
    #[inline]
    pub fn available(&self) -> usize {
        self.capacity() - self.used()
    }

    /// True iff no block is currently live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.top_block.get() == NO_BLOCK
    }

    /// Allocates `size` zeroed bytes aligned to `align`.
    ///
    /// # Errors
    ///
    /// - `InvalidAlignment` if `align` is not a power of two
    /// - `InvalidLayout` for zero-size requests
    /// - `OutOfMemory` if padding + header + size does not fit; the stack
    ///   is left unchanged
    pub fn alloc_aligned(&self, size: usize, align: usize) -> AllocResult<NonNull<[u8]>> {
        let user_offset = self.try_push(size, align)?;
        self.counters.record_allocation(self.offset.get());

        // SAFETY: try_push reserved [user_offset, user_offset + size) and
        // the pointer derives from a live Box allocation.
        let ptr = unsafe { NonNull::new_unchecked(self.buffer.at(user_offset)) };
        Ok(NonNull::slice_from_raw_parts(ptr, size))
    }

    /// Frees the top block.
    ///
    /// Returns `false` without changing any state when `ptr` is not inside
    /// the allocated region or is not the most recent live block (a
    /// non-LIFO free).
    ///
    /// # Safety
    ///
    /// On success the block's memory must no longer be accessed. `ptr` must
    /// either be a pointer previously returned by this allocator or be
    /// harmless to reject; passing unrelated in-range addresses reads
    /// header bytes from the region but never writes through them.
    pub unsafe fn free(&self, ptr: NonNull<u8>) -> bool {
        let addr = ptr.as_ptr() as usize;
        let Some(user_offset) = self.buffer.offset_of(addr) else {
            return false;
        };
        // past the cursor: nothing there has been allocated yet
        if user_offset >= self.offset.get() || user_offset < HEADER_SIZE {
            return false;
        }

        // SAFETY: header range [user_offset - HEADER_SIZE, user_offset) is
        // inside the buffer per the checks above.
        let header = unsafe { self.read_header(user_offset) };
        if header.prev_offset != self.prev_offset.get() {
            // not the top block: out-of-order free
            return false;
        }

        if let Some(pattern) = self.config.dealloc_pattern {
            let released = self.offset.get() - header.prev_offset;
            // SAFETY: the released range is inside the allocated prefix and
            // the caller guarantees the block is dead.
            unsafe { self.buffer.fill(header.prev_offset, released, pattern) };
        }

        self.offset.set(header.prev_offset);
        if header.prev_block != NO_BLOCK {
            // SAFETY: prev_block is a live block's user offset.
            let mut prev_header = unsafe { self.read_header(header.prev_block) };
            self.prev_offset.set(prev_header.prev_offset);
            self.top_block.set(header.prev_block);
            // the new top is the list tail again
            prev_header.next_block = NO_BLOCK;
            // SAFETY: writing the live previous header in place.
            unsafe { self.write_header(header.prev_block, prev_header) };
        } else {
            self.prev_offset.set(0);
            self.top_block.set(NO_BLOCK);
        }

        self.counters.record_deallocation();
        true
    }

    /// Grows or shrinks an existing block.
    ///
    /// - `None` input allocates a fresh block.
    /// - `new_size == 0` frees the block (best-effort) and returns
    ///   `Ok(None)`.
    /// - The top block is resized in place and keeps its address.
    /// - Any other live block moves to a fresh top allocation with
    ///   `min(old_size, new_size)` bytes copied; the old block is retired
    ///   and its address must never be used again. A later resize of the
    ///   retired address fails with `RetiredBlock`, and a later `free` of
    ///   it fails.
    ///
    /// Changing the alignment of a block is not supported: `align` must be
    /// the alignment the block was allocated with.
    ///
    /// # Safety
    ///
    /// `old_ptr`, when present, must point to a block of `old_size` bytes
    /// previously returned by this allocator and not freed or retired
    /// since (a retired address is detected and rejected, but must not
    /// have been reused in the meantime). After a move, the old address
    /// must not be used.
    ///
    /// # Errors
    ///
    /// - `InvalidAlignment` for a non-power-of-two `align`
    /// - `OutOfRange` if the pointer is not inside the allocated prefix
    /// - `RetiredBlock` if the block was retired by an earlier resize
    /// - `OutOfMemory` if the resize does not fit; all state unchanged
    pub unsafe fn resize_aligned(
        &self,
        old_ptr: Option<NonNull<u8>>,
        old_size: usize,
        new_size: usize,
        align: usize,
    ) -> AllocResult<Option<NonNull<[u8]>>> {
        if !is_power_of_two(align) {
            return Err(AllocError::invalid_alignment(align));
        }

        let Some(old_ptr) = old_ptr else {
            return self.alloc_aligned(new_size, align).map(Some);
        };
        if new_size == 0 {
            // SAFETY: forwarded caller contract.
            let _ = unsafe { self.free(old_ptr) };
            return Ok(None);
        }

        let addr = old_ptr.as_ptr() as usize;
        let Some(user_offset) = self.buffer.offset_of(addr) else {
            return Err(AllocError::out_of_range(addr));
        };
        if user_offset >= self.offset.get() || user_offset < HEADER_SIZE {
            return Err(AllocError::out_of_range(addr));
        }

        // Top-block fast path: move the cursor, keep the address.
        if self.top_block.get() == user_offset {
            let new_end = user_offset
                .checked_add(new_size)
                .ok_or(AllocError::size_overflow("resized block end"))?;
            if new_end > self.capacity() {
                self.counters.record_failure();
                return Err(AllocError::out_of_memory(new_size, align, self.available()));
            }

            if new_size > old_size {
                // SAFETY: the revealed tail is inside the buffer and is not
                // covered by any other block.
                unsafe { self.buffer.zero(user_offset + old_size, new_size - old_size) };
            } else if let Some(pattern) = self.config.dealloc_pattern {
                let released = self.offset.get().saturating_sub(new_end);
                // SAFETY: the released tail is inside the allocated prefix.
                unsafe { self.buffer.fill(new_end, released, pattern) };
            }
            self.offset.set(new_end);
            self.counters.record_reallocation(self.offset.get());
            return Ok(Some(NonNull::slice_from_raw_parts(old_ptr, new_size)));
        }

        // SAFETY: header range is inside the buffer per the checks above.
        let header = unsafe { self.read_header(user_offset) };
        if header.is_unlinked() {
            // already retired by a previous resize of this address
            return Err(AllocError::RetiredBlock);
        }

        // Middle block: move the data to a fresh top allocation, then
        // splice the old header out of the live list.
        let new_user_offset = self.try_push(new_size, align)?;
        let copy_len = old_size.min(new_size);
        // SAFETY: both ranges are inside the buffer; ptr::copy tolerates
        // overlap.
        unsafe {
            ptr::copy(old_ptr.as_ptr(), self.buffer.at(new_user_offset), copy_len);
        }

        // Re-read neighbours after try_push: pushing the new block updated
        // the old top's header, which may be one of them.
        if header.next_block != NO_BLOCK {
            // SAFETY: next_block is a live block's user offset.
            let mut next_header = unsafe { self.read_header(header.next_block) };
            // Folding this block's padding into its successor keeps the
            // cursor walk-back exact once the successor is freed.
            next_header.padding += header.padding;
            next_header.prev_offset = header.prev_offset;
            next_header.prev_block = header.prev_block;
            // SAFETY: writing the live successor header in place.
            unsafe { self.write_header(header.next_block, next_header) };
        }
        if header.prev_block != NO_BLOCK {
            // SAFETY: prev_block is a live block's user offset.
            let mut prev_header = unsafe { self.read_header(header.prev_block) };
            prev_header.next_block = header.next_block;
            // SAFETY: writing the live predecessor header in place.
            unsafe { self.write_header(header.prev_block, prev_header) };
        }

        // Cleared links are the retired-block sentinel.
        let retired =
            BlockHeader { prev_block: NO_BLOCK, next_block: NO_BLOCK, ..header };
        // SAFETY: writing the retired block's own header in place.
        unsafe { self.write_header(user_offset, retired) };

        self.counters.record_reallocation(self.offset.get());
        // SAFETY: the pointer derives from a live Box allocation.
        let ptr = unsafe { NonNull::new_unchecked(self.buffer.at(new_user_offset)) };
        Ok(Some(NonNull::slice_from_raw_parts(ptr, new_size)))
    }

    /// Releases every block at once.
    ///
    /// # Safety
    ///
    /// Invalidates every pointer previously returned by this allocator.
    pub unsafe fn reset(&self) {
        #[cfg(feature = "tracing")]
        trace!(released = self.offset.get(), "stack reset");

        if let Some(pattern) = self.config.dealloc_pattern {
            // SAFETY: the allocated prefix is inside the buffer and the
            // caller guarantees no pointers into it survive this call.
            unsafe { self.buffer.fill(0, self.offset.get(), pattern) };
        }
        self.offset.set(0);
        self.prev_offset.set(0);
        self.top_block.set(NO_BLOCK);
        self.counters.reset();
    }

    /// Captures the current position.
    ///
    /// Restoring the marker releases everything allocated after this call.
    pub fn mark(&self) -> StackMarker {
        StackMarker {
            offset: self.offset.get(),
            prev_offset: self.prev_offset.get(),
            top_block: self.top_block.get(),
        }
    }

    /// Restores the stack to a previous marker position, releasing every
    /// block allocated after the marker was taken.
    ///
    /// # Safety
    ///
    /// - the marker must come from this allocator
    /// - pointers to blocks allocated after the marker become invalid
    /// - no block live at mark time may have been freed or retired since
    pub unsafe fn restore_to_marker(&self, marker: StackMarker) -> AllocResult<()> {
        if marker.offset > self.offset.get() {
            return Err(AllocError::invalid_layout("marker is in the future"));
        }
        if marker.offset > self.capacity() {
            return Err(AllocError::invalid_layout("marker is out of bounds"));
        }

        if let Some(pattern) = self.config.dealloc_pattern {
            let released = self.offset.get() - marker.offset;
            // SAFETY: released range is inside the allocated prefix.
            unsafe { self.buffer.fill(marker.offset, released, pattern) };
        }

        self.offset.set(marker.offset);
        self.prev_offset.set(marker.prev_offset);
        self.top_block.set(marker.top_block);
        if marker.top_block != NO_BLOCK {
            // SAFETY: the marker's top block is live again per the caller
            // contract.
            let mut header = unsafe { self.read_header(marker.top_block) };
            // it is the list tail again
            header.next_block = NO_BLOCK;
            // SAFETY: writing the live top header in place.
            unsafe { self.write_header(marker.top_block, header) };
        }
        Ok(())
    }

    /// Reserves padding + header + `size` bytes, links the new block as the
    /// top, and zeroes the user region. Shared by allocation and the moving
    /// resize path; does not touch statistics.
    fn try_push(&self, size: usize, align: usize) -> AllocResult<usize> {
        if !is_power_of_two(align) {
            return Err(AllocError::invalid_alignment(align));
        }
        if size == 0 {
            return Err(AllocError::invalid_layout("zero-size allocation"));
        }
        let align = align.min(MAX_ALIGN);

        let base = self.buffer.start_addr() + self.offset.get();
        let padding = padding_with_header(base, align, HEADER_SIZE);
        let needed = padding
            .checked_add(size)
            .ok_or(AllocError::size_overflow("padded allocation size"))?;
        let end = self
            .offset
            .get()
            .checked_add(needed)
            .ok_or(AllocError::size_overflow("allocation end offset"))?;
        if end > self.capacity() {
            self.counters.record_failure();
            #[cfg(feature = "tracing")]
            trace!(size, align, available = self.available(), "stack allocation failed");
            return Err(AllocError::out_of_memory(size, align, self.available()));
        }

        let cursor = self.offset.get();
        let user_offset = cursor + padding;
        let header = BlockHeader {
            padding,
            prev_offset: cursor,
            prev_block: self.top_block.get(),
            next_block: NO_BLOCK,
        };
        // SAFETY: the header range lies in the padding just reserved.
        unsafe { self.write_header(user_offset, header) };

        if self.top_block.get() != NO_BLOCK {
            // SAFETY: the previous top is a live block's user offset.
            let mut prev_header = unsafe { self.read_header(self.top_block.get()) };
            prev_header.next_block = user_offset;
            // SAFETY: writing the live previous top header in place.
            unsafe { self.write_header(self.top_block.get(), prev_header) };
        }

        self.top_block.set(user_offset);
        self.prev_offset.set(cursor);
        self.offset.set(user_offset + size);
        // SAFETY: the user range was just reserved and is disjoint from
        // every header and earlier block.
        unsafe { self.buffer.zero(user_offset, size) };
        Ok(user_offset)
    }

    /// Reads the header of the block at `user_offset`.
    ///
    /// # Safety
    ///
    /// `user_offset` must be `>= HEADER_SIZE` and at most the current
    /// cursor, so the header range lies inside the buffer.
    unsafe fn read_header(&self, user_offset: usize) -> BlockHeader {
        debug_assert!(user_offset >= HEADER_SIZE);
        // SAFETY: range checked by the caller; headers are not necessarily
        // word-aligned, hence read_unaligned.
        unsafe {
            ptr::read_unaligned(self.buffer.at(user_offset - HEADER_SIZE) as *const BlockHeader)
        }
    }

    /// Writes the header of the block at `user_offset`.
    ///
    /// # Safety
    ///
    /// Same contract as [`Self::read_header`].
    unsafe fn write_header(&self, user_offset: usize, header: BlockHeader) {
        debug_assert!(user_offset >= HEADER_SIZE);
        // SAFETY: range checked by the caller.
        unsafe {
            ptr::write_unaligned(
                self.buffer.at(user_offset - HEADER_SIZE) as *mut BlockHeader,
                header,
            );
        }
    }
}

// SAFETY: allocate hands out aligned, zeroed, non-overlapping ranges of the
// owned buffer; deallocate forwards to the boolean LIFO free (best-effort).
unsafe impl Allocator for StackAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        self.alloc_aligned(layout.size(), layout.align())
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) {
        // Best-effort: a non-LIFO deallocation through the generic trait is
        // a no-op, same as for the arena.
        // SAFETY: forwarded caller contract.
        let _ = unsafe { self.free(ptr) };
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
        let resized = unsafe {
            self.resize_aligned(
                Some(ptr),
                old_layout.size(),
                new_layout.size(),
                new_layout.align(),
            )?
        };
        resized.ok_or(AllocError::invalid_layout("zero-size allocation"))
    }
}

impl MemoryUsage for StackAllocator {
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

impl Resettable for StackAllocator {
    unsafe fn reset(&self) {
        // SAFETY: forwarded caller contract.
        unsafe { StackAllocator::reset(self) }
    }
}

impl StatisticsProvider for StackAllocator {
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

    fn stack(capacity: usize) -> StackAllocator {
        StackAllocator::with_config(capacity, StackConfig::production())
            .expect("failed to create stack allocator")
    }

    #[test]
    fn test_header_immediately_precedes_block() {
        let s = stack(256);
        let ptr = s.alloc_aligned(16, 16).unwrap();
        let user_offset = ptr.cast::<u8>().as_ptr() as usize - s.buffer.start_addr();

        let header = unsafe { s.read_header(user_offset) };
        assert_eq!(header.prev_offset, 0);
        assert_eq!(header.padding, user_offset);
        assert!(header.padding >= HEADER_SIZE);
        assert_eq!(header.prev_block, NO_BLOCK);
        assert_eq!(header.next_block, NO_BLOCK);
    }

    #[test]
    fn test_headers_form_allocation_ordered_list() {
        let s = stack(512);
        let a = s.alloc_aligned(8, 8).unwrap();
        let b = s.alloc_aligned(8, 8).unwrap();
        let c = s.alloc_aligned(8, 8).unwrap();
        let off = |p: NonNull<[u8]>| p.cast::<u8>().as_ptr() as usize - s.buffer.start_addr();

        let ha = unsafe { s.read_header(off(a)) };
        let hb = unsafe { s.read_header(off(b)) };
        let hc = unsafe { s.read_header(off(c)) };
        assert_eq!(ha.prev_block, NO_BLOCK);
        assert_eq!(ha.next_block, off(b));
        assert_eq!(hb.prev_block, off(a));
        assert_eq!(hb.next_block, off(c));
        assert_eq!(hc.prev_block, off(b));
        assert_eq!(hc.next_block, NO_BLOCK);
        assert_eq!(s.top_block.get(), off(c));
        assert_eq!(s.prev_offset.get(), hc.prev_offset);
    }

    #[test]
    fn test_middle_resize_folds_padding_into_successor() {
        let s = stack(512);
        let _a = s.alloc_aligned(8, 8).unwrap();
        let b = s.alloc_aligned(8, 8).unwrap();
        let c = s.alloc_aligned(8, 8).unwrap();
        let off = |p: NonNull<[u8]>| p.cast::<u8>().as_ptr() as usize - s.buffer.start_addr();

        let hb = unsafe { s.read_header(off(b)) };
        let hc_before = unsafe { s.read_header(off(c)) };

        let moved = unsafe { s.resize_aligned(Some(b.cast()), 8, 16, 8) }
            .unwrap()
            .expect("non-zero resize returns a block");
        assert_ne!(moved.cast::<u8>(), b.cast::<u8>());

        let hc = unsafe { s.read_header(off(c)) };
        assert_eq!(hc.padding, hc_before.padding + hb.padding);
        assert_eq!(hc.prev_offset, hb.prev_offset);
        assert_eq!(hc.prev_block, hb.prev_block);

        let hb_after = unsafe { s.read_header(off(b)) };
        assert!(hb_after.is_unlinked());
    }

    #[test]
    fn test_full_lifo_cycle_returns_to_empty() {
        let s = stack(512);
        let a = s.alloc_aligned(24, 8).unwrap();
        let b = s.alloc_aligned(40, 32).unwrap();
        assert!(unsafe { s.free(b.cast()) });
        assert!(unsafe { s.free(a.cast()) });
        assert_eq!(s.offset.get(), 0);
        assert_eq!(s.prev_offset.get(), 0);
        assert_eq!(s.top_block.get(), NO_BLOCK);
    }
}
