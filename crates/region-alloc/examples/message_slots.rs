//! Fixed-size message slots served from a pool.
//!
//! Uniform network-message buffers come from a pool with O(1) alloc/free
//! and zero fragmentation; a LIFO stack handles the variably-sized parse
//! scratch on the side.

use region_alloc::prelude::*;

const SLOT: usize = 256;

fn main() -> AllocResult<()> {
    let pool = PoolAllocator::new(16 * 1024, SLOT, 64)?;
    let scratch = StackAllocator::new(4 * 1024)?;

    println!(
        "pool: {} slots of {} bytes (align {})",
        pool.chunk_count(),
        pool.chunk_size(),
        pool.chunk_align(),
    );

    let mut in_flight = Vec::new();
    for _ in 0..8 {
        in_flight.push(pool.alloc()?);
    }
    println!("in flight: {} slots, {} free", pool.allocated_chunks(), pool.free_chunks());

    // parse one message with LIFO scratch
    let frame = StackFrame::new(&scratch);
    let header = frame.allocator().alloc_aligned(64, 8)?;
    let body = frame.allocator().alloc_aligned(512, 8)?;
    println!("scratch: header {:p}, body {:p}", header, body);
    frame.restore();

    // completed messages go back to the pool in any order
    for slot in in_flight.drain(..).rev() {
        unsafe { pool.free(slot.cast()) };
    }
    println!("drained: {} slots free", pool.free_chunks());

    Ok(())
}
