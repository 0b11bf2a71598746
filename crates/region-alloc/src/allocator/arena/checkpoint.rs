//! Checkpoint/restore support for the arena.

use super::ArenaAllocator;

/// Saved arena position that can later be restored, releasing everything
/// allocated after it.
///
/// Checkpoints carry a generation counter; a checkpoint taken before a
/// `reset` is stale and will be rejected by `restore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaCheckpoint {
    pub(super) offset: usize,
    pub(super) prev_offset: usize,
    pub(super) generation: u32,
}

/// RAII helper that restores the arena to its construction-time position
/// when dropped.
pub struct ArenaScope<'a> {
    allocator: &'a ArenaAllocator,
    checkpoint: ArenaCheckpoint,
}

impl<'a> ArenaScope<'a> {
    /// Opens a scope at the arena's current position.
    pub fn new(allocator: &'a ArenaAllocator) -> Self {
        let checkpoint = allocator.checkpoint();
        Self { allocator, checkpoint }
    }

    /// The underlying allocator.
    pub fn allocator(&self) -> &'a ArenaAllocator {
        self.allocator
    }

    /// Restores eagerly, consuming the scope.
    pub fn restore(self) {
        drop(self);
    }
}

impl Drop for ArenaScope<'_> {
    fn drop(&mut self) {
        // SAFETY: the scope borrows the allocator for its whole lifetime;
        // pointers into the released range must not outlive the scope per
        // its contract.
        unsafe {
            let _ = self.allocator.restore(self.checkpoint);
        }
    }
}
