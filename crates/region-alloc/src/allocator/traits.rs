//! Trait seams shared by the allocators.
//!
//! The traits mirror the shape of `core::alloc` but report failures through
//! [`AllocError`] and add the reset capability every region allocator has.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::error::{AllocError, AllocResult};
use crate::utils::is_power_of_two;

/// Validates layout parameters before an allocation attempt.
#[inline]
fn validate_layout(layout: Layout) -> AllocResult<()> {
    if !is_power_of_two(layout.align()) {
        return Err(AllocError::invalid_alignment(layout.align()));
    }
    if layout.size() > isize::MAX as usize - (layout.align() - 1) {
        return Err(AllocError::size_overflow("layout size with padding"));
    }
    Ok(())
}

/// Layout-based allocation interface over a fixed region.
///
/// # Safety
///
/// Implementors must return pointers that are valid, aligned per the
/// layout, and disjoint from every other live allocation in the region.
/// Callers must not use returned pointers after the allocator is reset or
/// dropped, and must pass back the layout the allocation was made with.
pub unsafe trait Allocator {
    /// Allocates zeroed memory for `layout`.
    ///
    /// # Safety
    ///
    /// The returned pointer is tied to this allocator's lifetime and to the
    /// next state-invalidating call (`reset`, a conflicting resize).
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>>;

    /// Deallocates `ptr`.
    ///
    /// Best-effort for disciplines that cannot free at arbitrary points
    /// (bump allocation ignores this; LIFO allocation frees only the top).
    ///
    /// # Safety
    ///
    /// `ptr` must have been allocated by this allocator with `layout`, and
    /// must not be used after this call.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Grows or shrinks an existing allocation, moving it if necessary.
    ///
    /// The default implementation allocates, copies
    /// `min(old_layout.size(), new_layout.size())` bytes and frees the old
    /// block best-effort. Implementors override this with their in-place
    /// fast paths.
    ///
    /// # Safety
    ///
    /// `ptr` must have been allocated by this allocator with `old_layout`.
    /// On success the old pointer must no longer be used.
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        validate_layout(new_layout)?;

        if old_layout.size() == new_layout.size() && old_layout.align() == new_layout.align() {
            return Ok(NonNull::slice_from_raw_parts(ptr, new_layout.size()));
        }

        // SAFETY: new_layout validated above; forwarded caller contract.
        let new_ptr = unsafe { self.allocate(new_layout)? };
        let copy_len = old_layout.size().min(new_layout.size());
        if copy_len > 0 {
            // SAFETY: both regions are valid for copy_len bytes; copy
            // tolerates overlap.
            unsafe {
                core::ptr::copy(ptr.as_ptr(), new_ptr.cast::<u8>().as_ptr(), copy_len);
            }
        }
        // SAFETY: forwarded caller contract; deallocate is best-effort.
        unsafe { self.deallocate(ptr, old_layout) };
        Ok(new_ptr)
    }
}

/// Memory usage reporting.
pub trait MemoryUsage {
    /// Bytes currently allocated out of the region.
    fn used_memory(&self) -> usize;

    /// Bytes still available, when the allocator can tell.
    fn available_memory(&self) -> Option<usize>;

    /// Total region size, when the allocator can tell.
    fn total_memory(&self) -> Option<usize> {
        match (self.used_memory(), self.available_memory()) {
            (used, Some(available)) => Some(used + available),
            _ => None,
        }
    }
}

/// Allocators that can release every allocation at once.
pub trait Resettable {
    /// Returns the allocator to its freshly constructed state.
    ///
    /// # Safety
    ///
    /// Invalidates every pointer previously returned by this allocator;
    /// callers must ensure none are used afterwards.
    unsafe fn reset(&self);

    /// Whether reset is currently possible.
    fn can_reset(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_layout_accepts_ordinary_layouts() {
        assert!(validate_layout(Layout::new::<u64>()).is_ok());
        assert!(validate_layout(Layout::from_size_align(0, 1).unwrap()).is_ok());
    }
}
