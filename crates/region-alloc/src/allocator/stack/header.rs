//! Per-block header threaded through the alignment padding.

use core::mem;

/// Sentinel for absent block links.
pub(crate) const NO_BLOCK: usize = usize::MAX;

/// Bookkeeping record preceding every live stack block.
///
/// The header occupies the last [`HEADER_SIZE`] bytes of the block's
/// alignment padding, so for a block at user offset `u` the header starts
/// at `u - HEADER_SIZE`. Links are buffer offsets of *user* addresses, not
/// raw pointers, so the structure stays self-contained inside the owned
/// region.
///
/// Headers may land at byte offsets that are not word-aligned (small block
/// alignments produce small paddings), so all access goes through
/// `read_unaligned`/`write_unaligned`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub(crate) struct BlockHeader {
    /// Padding this block consumed, the header itself included.
    pub padding: usize,
    /// Allocator cursor value from just before this block was allocated.
    pub prev_offset: usize,
    /// User offset of the previous live block, or [`NO_BLOCK`].
    pub prev_block: usize,
    /// User offset of the next live block, or [`NO_BLOCK`].
    pub next_block: usize,
}

impl BlockHeader {
    /// A block whose links are both cleared and which is not the top has
    /// been retired by a resize; its address must not be used again.
    #[inline]
    pub(crate) fn is_unlinked(&self) -> bool {
        self.prev_block == NO_BLOCK && self.next_block == NO_BLOCK
    }
}

/// Bytes the header occupies inside the padding.
pub(crate) const HEADER_SIZE: usize = mem::size_of::<BlockHeader>();

/// Largest alignment the word-sized `padding` field can account for.
pub(crate) const MAX_ALIGN: usize = 1 << (usize::BITS - 1);
