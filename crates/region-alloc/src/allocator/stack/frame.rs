//! RAII-based stack frame for automatic restoration.

use super::{StackAllocator, StackMarker};

/// RAII helper for stack-based scoped allocation.
///
/// Automatically restores the stack to the position it had at construction
/// when dropped.
pub struct StackFrame<'a> {
    allocator: &'a StackAllocator,
    marker: StackMarker,
}

impl<'a> StackFrame<'a> {
    /// Creates a frame that restores to the current position on drop.
    pub fn new(allocator: &'a StackAllocator) -> Self {
        let marker = allocator.mark();
        Self { allocator, marker }
    }

    /// The underlying allocator.
    pub fn allocator(&self) -> &'a StackAllocator {
        self.allocator
    }

    /// Restores eagerly, consuming this frame.
    pub fn restore(self) {
        drop(self);
    }
}

impl Drop for StackFrame<'_> {
    fn drop(&mut self) {
        // SAFETY: the frame borrows the allocator for its whole lifetime;
        // pointers into the released range must not outlive the frame per
        // its contract.
        unsafe {
            let _ = self.allocator.restore_to_marker(self.marker);
        }
    }
}
