//! Main pool allocator implementation.
//!
//! Fixed-size chunks carved from the aligned prefix of the region, served
//! from an intrusive singly linked free list: each free chunk's first bytes
//! hold the offset of the next free chunk.
//!
//! ## Invariants
//!
//! - every free-list entry is `aligned_offset + i * chunk_size` for some
//!   `i < chunk_count`
//! - `chunk_size` is a multiple of `chunk_align` and holds at least one
//!   free-list link
//! - allocated chunks are disjoint from the free list
//! - double-free is not detected; freeing an address twice corrupts the
//!   free list (caller contract)

use core::alloc::Layout;
use core::cell::Cell;
use core::mem;
use core::ptr::{self, NonNull};

use alloc::boxed::Box;

use super::PoolConfig;
use crate::allocator::{Allocator, MemoryUsage, Resettable};
use crate::buffer::RegionBuffer;
use crate::error::{AllocError, AllocResult};
use crate::stats::{AllocatorStats, OpCounters, StatisticsProvider};
use crate::utils::{align_up, is_power_of_two};

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

/// Sentinel terminating the free list.
const NO_CHUNK: usize = usize::MAX;

/// Pool allocator for fixed-size chunks.
///
/// All allocations have the same size and alignment, fixed at construction.
///
/// # Memory Layout
/// ```text
/// [start][waste][chunk0][chunk1][chunk2]...[chunkN][remainder]
///                  ↓       ↓       ↓
///                [free] → [free] → [used]...→ (end of list)
/// ```
///
/// `waste` is whatever it takes to bring the first chunk onto a
/// `chunk_align` boundary; `remainder` is the tail too small to hold one
/// more chunk. Neither is ever handed out.
pub struct PoolAllocator {
    /// Backing region.
    buffer: RegionBuffer,

    /// Configuration.
    config: PoolConfig,

    /// Offset of the first (aligned) chunk from the region start.
    aligned_offset: usize,

    /// Size of each chunk, rounded up to a multiple of `chunk_align`.
    chunk_size: usize,

    /// Alignment of each chunk.
    chunk_align: usize,

    /// Number of chunks, fixed at construction.
    chunk_count: usize,

    /// Offset of the first free chunk, or [`NO_CHUNK`].
    free_head: Cell<usize>,

    /// Number of chunks currently on the free list.
    free_count: Cell<usize>,

    /// Optional statistics.
    counters: OpCounters,
}

impl PoolAllocator {
    /// Creates a pool over `capacity` bytes serving `chunk_size`-byte
    /// chunks aligned to `chunk_align`, with a custom configuration.
    ///
    /// The chunk size is rounded up to a multiple of the alignment, and the
    /// start of the region is advanced to an aligned boundary; both reduce
    /// the number of chunks that fit.
    ///
    /// # Errors
    ///
    /// - `InvalidAlignment` if `chunk_align` is not a power of two
    /// - `InvalidLayout` if the chunk cannot hold a free-list link, the
    ///   capacity is zero, or not even one chunk fits after alignment
    pub fn with_config(
        capacity: usize,
        chunk_size: usize,
        chunk_align: usize,
        config: PoolConfig,
    ) -> AllocResult<Self> {
        if !is_power_of_two(chunk_align) {
            return Err(AllocError::invalid_alignment(chunk_align));
        }
        if chunk_size == 0 {
            return Err(AllocError::invalid_layout("chunk size cannot be zero"));
        }
        let buffer = RegionBuffer::new_zeroed(capacity)
            .ok_or(AllocError::invalid_layout("capacity cannot be zero"))?;
        Self::from_parts(buffer, chunk_size, chunk_align, config)
    }

    /// Creates a pool with the default configuration.
    pub fn new(capacity: usize, chunk_size: usize, chunk_align: usize) -> AllocResult<Self> {
        Self::with_config(capacity, chunk_size, chunk_align, PoolConfig::default())
    }

    /// Creates a pool over a caller-supplied buffer.
    pub fn from_boxed_slice(
        memory: Box<[u8]>,
        chunk_size: usize,
        chunk_align: usize,
    ) -> AllocResult<Self> {
        if !is_power_of_two(chunk_align) {
            return Err(AllocError::invalid_alignment(chunk_align));
        }
        if chunk_size == 0 {
            return Err(AllocError::invalid_layout("chunk size cannot be zero"));
        }
        Self::from_parts(
            RegionBuffer::from_boxed_slice(memory),
            chunk_size,
            chunk_align,
            PoolConfig::default(),
        )
    }

    /// Creates a pool whose chunks fit values of the given layout.
    pub fn for_layout(capacity: usize, layout: Layout) -> AllocResult<Self> {
        let chunk_size = layout.size().max(mem::size_of::<usize>());
        Self::new(capacity, chunk_size, layout.align())
    }

    /// Creates a pool whose chunks fit values of type `T`.
    ///
    /// Only the size and alignment of `T` are used; the pool never
    /// constructs or drops values.
    pub fn for_type<T>(capacity: usize) -> AllocResult<Self> {
        Self::for_layout(capacity, Layout::new::<T>())
    }

    fn from_parts(
        buffer: RegionBuffer,
        chunk_size: usize,
        chunk_align: usize,
        config: PoolConfig,
    ) -> AllocResult<Self> {
        let aligned_offset = align_up(buffer.start_addr(), chunk_align) - buffer.start_addr();
        let chunk_size = align_up(chunk_size, chunk_align);
        if chunk_size < mem::size_of::<usize>() {
            return Err(AllocError::invalid_layout("chunk cannot hold a free-list link"));
        }

        let usable = buffer.capacity().saturating_sub(aligned_offset);
        let chunk_count = usable / chunk_size;
        if chunk_count == 0 {
            return Err(AllocError::invalid_layout("region too small for a single chunk"));
        }

        #[cfg(feature = "tracing")]
        debug!(
            capacity = buffer.capacity(),
            chunk_size, chunk_align, chunk_count, "pool allocator created"
        );

        let track_stats = config.track_stats;
        let pool = Self {
            buffer,
            config,
            aligned_offset,
            chunk_size,
            chunk_align,
            chunk_count,
            free_head: Cell::new(NO_CHUNK),
            free_count: Cell::new(0),
            counters: OpCounters::new(track_stats),
        };
        pool.link_all_chunks();
        Ok(pool)
    }

    /// Size of each chunk in bytes (after rounding).
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Alignment of each chunk.
    #[inline]
    pub fn chunk_align(&self) -> usize {
        self.chunk_align
    }

    /// Total number of chunks in the pool.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Usable capacity in bytes (the exact chunk region).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.chunk_count * self.chunk_size
    }

    /// Number of chunks currently free.
    #[inline]
    pub fn free_chunks(&self) -> usize {
        self.free_count.get()
    }

    /// Number of chunks currently allocated.
    #[inline]
    pub fn allocated_chunks(&self) -> usize {
        self.chunk_count - self.free_count.get()
    }

    /// True iff no chunk is free.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.free_head.get() == NO_CHUNK
    }

    /// True iff every chunk is free.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.free_count.get() == self.chunk_count
    }

    /// True iff `ptr` points into the chunk region.
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.chunk_offset_of(ptr as usize).is_some()
    }

    /// Allocates one zeroed chunk.
    ///
    /// # Errors
    ///
    /// `OutOfMemory` when every chunk is in use.
    pub fn alloc(&self) -> AllocResult<NonNull<[u8]>> {
        let head = self.free_head.get();
        if head == NO_CHUNK {
            self.counters.record_failure();
            #[cfg(feature = "tracing")]
            trace!(chunk_size = self.chunk_size, "pool exhausted");
            return Err(AllocError::out_of_memory(self.chunk_size, self.chunk_align, 0));
        }

        // SAFETY: head is a valid free chunk offset; its first bytes hold
        // the next-chunk link.
        let next = unsafe { self.read_link(head) };
        self.free_head.set(next);
        self.free_count.set(self.free_count.get() - 1);

        // SAFETY: the chunk is now exclusively owned by the caller.
        unsafe { self.buffer.zero(head, self.chunk_size) };
        self.counters.record_allocation(self.used_memory());

        // SAFETY: the pointer derives from a live Box allocation.
        let ptr = unsafe { NonNull::new_unchecked(self.buffer.at(head)) };
        Ok(NonNull::slice_from_raw_parts(ptr, self.chunk_size))
    }

    /// Returns a chunk to the free list.
    ///
    /// Returns `false` without changing any state when `ptr` is outside the
    /// chunk region or not on a chunk boundary.
    ///
    /// # Safety
    ///
    /// `ptr` must be a chunk previously returned by [`Self::alloc`] and not
    /// freed since; freeing a chunk twice corrupts the free list. The chunk
    /// must no longer be accessed after this call.
    pub unsafe fn free(&self, ptr: NonNull<u8>) -> bool {
        let addr = ptr.as_ptr() as usize;
        let Some(chunk_offset) = self.chunk_offset_of(addr) else {
            return false;
        };

        if let Some(pattern) = self.config.dealloc_pattern {
            // SAFETY: the chunk is dead per the caller contract.
            unsafe { self.buffer.fill(chunk_offset, self.chunk_size, pattern) };
        }

        // SAFETY: the chunk is dead, its first bytes become the link.
        unsafe { self.write_link(chunk_offset, self.free_head.get()) };
        self.free_head.set(chunk_offset);
        self.free_count.set(self.free_count.get() + 1);
        self.counters.record_deallocation();
        true
    }

    /// Rebuilds the free list from every chunk slot.
    ///
    /// # Safety
    ///
    /// Invalidates every chunk previously returned by this pool.
    pub unsafe fn free_all(&self) {
        #[cfg(feature = "tracing")]
        trace!(chunks = self.chunk_count, "pool free_all");

        if let Some(pattern) = self.config.dealloc_pattern {
            // SAFETY: every chunk is dead per the caller contract.
            unsafe { self.buffer.fill(self.aligned_offset, self.capacity(), pattern) };
        }
        self.link_all_chunks();
        self.counters.reset();
    }

    /// Links every chunk into the free list, first chunk at the head.
    fn link_all_chunks(&self) {
        let mut next = NO_CHUNK;
        for i in (0..self.chunk_count).rev() {
            let chunk_offset = self.aligned_offset + i * self.chunk_size;
            // SAFETY: chunk_offset is inside the chunk region; the chunk is
            // free during (re)initialization.
            unsafe { self.write_link(chunk_offset, next) };
            next = chunk_offset;
        }
        self.free_head.set(next);
        self.free_count.set(self.chunk_count);
    }

    /// Offset of the chunk starting at `addr`, if `addr` is exactly a chunk
    /// boundary inside the chunk region.
    fn chunk_offset_of(&self, addr: usize) -> Option<usize> {
        let offset = self.buffer.offset_of(addr)?;
        let relative = offset.checked_sub(self.aligned_offset)?;
        let in_region = relative < self.chunk_count * self.chunk_size;
        (in_region && relative % self.chunk_size == 0).then_some(offset)
    }

    /// Reads the free-list link stored in the chunk at `chunk_offset`.
    ///
    /// # Safety
    ///
    /// The chunk must be free and `chunk_offset` must be a valid chunk
    /// start.
    unsafe fn read_link(&self, chunk_offset: usize) -> usize {
        // SAFETY: chunks hold at least one usize; alignment of the slot is
        // not guaranteed, hence read_unaligned.
        unsafe { ptr::read_unaligned(self.buffer.at(chunk_offset) as *const usize) }
    }

    /// Stores the free-list link in the chunk at `chunk_offset`.
    ///
    /// # Safety
    ///
    /// Same contract as [`Self::read_link`].
    unsafe fn write_link(&self, chunk_offset: usize, next: usize) {
        // SAFETY: see read_link.
        unsafe { ptr::write_unaligned(self.buffer.at(chunk_offset) as *mut usize, next) };
    }
}

// SAFETY: allocate hands out aligned, zeroed, exclusively owned chunks;
// deallocate validates the pointer before touching the free list.
unsafe impl Allocator for PoolAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        if layout.size() == 0 {
            return Err(AllocError::invalid_layout("zero-size allocation"));
        }
        if layout.size() > self.chunk_size || layout.align() > self.chunk_align {
            return Err(AllocError::invalid_layout("layout exceeds pool chunk"));
        }
        self.alloc()
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) {
        // SAFETY: forwarded caller contract.
        let _ = unsafe { self.free(ptr) };
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        _old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        // Chunks are fixed-size: a resize is valid exactly when the new
        // layout still fits the chunk, and then the block stays put.
        if new_layout.size() == 0 || new_layout.size() > self.chunk_size {
            return Err(AllocError::invalid_layout("layout exceeds pool chunk"));
        }
        if new_layout.align() > self.chunk_align {
            return Err(AllocError::invalid_layout("alignment change is not supported"));
        }
        Ok(NonNull::slice_from_raw_parts(ptr, new_layout.size()))
    }
}

impl MemoryUsage for PoolAllocator {
    fn used_memory(&self) -> usize {
        self.allocated_chunks() * self.chunk_size
    }

    fn available_memory(&self) -> Option<usize> {
        Some(self.free_chunks() * self.chunk_size)
    }

    fn total_memory(&self) -> Option<usize> {
        Some(self.capacity())
    }
}

impl Resettable for PoolAllocator {
    unsafe fn reset(&self) {
        // SAFETY: forwarded caller contract.
        unsafe { self.free_all() }
    }
}

impl StatisticsProvider for PoolAllocator {
    fn statistics(&self) -> AllocatorStats {
        self.counters.snapshot(self.used_memory())
    }

    fn reset_statistics(&self) {
        self.counters.reset();
    }

    fn statistics_enabled(&self) -> bool {
        self.counters.enabled()
    }
}
