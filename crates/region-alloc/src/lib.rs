//! # region-alloc
//!
//! Region-style memory allocators that carve allocations out of a single
//! fixed-size byte buffer.
//!
//! Three allocators are provided, all operating on a region that is sized
//! once at construction and never grows:
//! - [`ArenaAllocator`] — sequential bump allocation with whole-arena reset
//!   and an in-place resize fast path for the most recent allocation
//! - [`StackAllocator`] — LIFO allocation where individual blocks may be
//!   freed in strict reverse allocation order
//! - [`PoolAllocator`] — uniform fixed-size chunks served from an intrusive
//!   free list
//!
//! All successful allocations return zeroed, properly aligned memory inside
//! the managed region. Failed operations report [`AllocError`] and leave the
//! allocator state untouched. Deallocation only ever returns *logical* space;
//! the backing buffer itself is released when the allocator is dropped.
//!
//! ## Quick Start
//!
//! ```rust
//! use region_alloc::prelude::*;
//!
//! # fn main() -> AllocResult<()> {
//! // Bump-allocate out of a 4 KiB region, then recycle it wholesale.
//! let arena = ArenaAllocator::new(4096)?;
//! let ptr = arena.alloc_aligned(256, 16)?;
//! assert_eq!(ptr.cast::<u8>().as_ptr() as usize % 16, 0);
//! unsafe { arena.reset() };
//!
//! // Serve uniform 64-byte chunks from a pool.
//! let pool = PoolAllocator::new(4096, 64, 64)?;
//! let chunk = pool.alloc()?;
//! assert!(unsafe { pool.free(chunk.cast()) });
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency model
//!
//! These allocators are single-threaded and non-reentrant. They hold their
//! buffer in an [`UnsafeCell`](core::cell::UnsafeCell) and are deliberately
//! `!Sync`; callers that need sharing must wrap them externally.
//!
//! ## Features
//!
//! - `std` (default): standard library support
//! - `tracing`: sparse structured logging via the `tracing` crate

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

extern crate alloc;

mod buffer;
mod error;
mod stats;
mod utils;

// Memory allocators - the heart of the crate
pub mod allocator;

pub use crate::allocator::{ArenaAllocator, PoolAllocator, StackAllocator};
pub use crate::error::{AllocError, AllocResult};
pub use crate::stats::{AllocatorStats, StatisticsProvider};
pub use crate::utils::{
    align_down, align_up, is_aligned, is_power_of_two, padding_needed, padding_with_header,
};

/// Convenient re-exports of commonly used types and traits.
pub mod prelude {
    pub use crate::allocator::{
        Allocator, ArenaAllocator, ArenaCheckpoint, ArenaConfig, ArenaScope, MemoryUsage,
        PoolAllocator, PoolConfig, Resettable, StackAllocator, StackConfig, StackFrame,
        StackMarker,
    };
    pub use crate::error::{AllocError, AllocResult};
    pub use crate::stats::{AllocatorStats, StatisticsProvider};
}
