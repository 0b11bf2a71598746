//! Per-frame scratch memory with an arena.
//!
//! A classic game-loop pattern: every frame bump-allocates freely out of
//! one region, then the whole region is recycled with a single reset.

use region_alloc::prelude::*;

fn main() -> AllocResult<()> {
    let arena = ArenaAllocator::new(64 * 1024)?;

    for frame in 0..4 {
        // scratch allocations of whatever shape this frame needs
        let positions = arena.alloc_aligned(1024, 16)?;
        let indices = arena.alloc_aligned(512, 4)?;
        let labels = arena.alloc_aligned(300, 1)?;

        println!(
            "frame {frame}: scratch at {:p}/{:p}/{:p}, {} of {} bytes used",
            positions, indices, labels,
            arena.used(),
            arena.capacity(),
        );

        // everything from this frame is released at once
        unsafe { arena.reset() };
    }

    // temporary detours can be scoped instead of resetting the world
    let persistent = arena.alloc_aligned(128, 8)?;
    {
        let scope = arena.scoped();
        scope.allocator().alloc_aligned(8 * 1024, 8)?;
        println!("inside scope: {} bytes used", arena.used());
    }
    println!("after scope:  {} bytes used", arena.used());
    let _ = persistent;

    Ok(())
}
