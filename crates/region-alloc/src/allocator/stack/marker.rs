//! Position markers for scoped deallocation.

/// Saved stack position.
///
/// Restoring a marker releases every block allocated after it was taken,
/// without walking them individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackMarker {
    pub(super) offset: usize,
    pub(super) prev_offset: usize,
    pub(super) top_block: usize,
}
