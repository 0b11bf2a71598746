//! Allocation error type for the recoverable failure channel.
//!
//! Every fallible operation either succeeds or returns an [`AllocError`]
//! with the allocator state unchanged. There is no partial advance of
//! offsets and no free-list mutation on the error path.

/// Error returned by fallible allocator operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    /// The region cannot satisfy the requested size and alignment.
    #[error("out of memory: {requested} bytes (align {align}) requested, {available} available")]
    OutOfMemory {
        /// Requested size in bytes.
        requested: usize,
        /// Requested alignment.
        align: usize,
        /// Bytes still available in the region at the time of the request.
        available: usize,
    },

    /// Arithmetic overflow while sizing an allocation or a region.
    #[error("size overflow while computing {context}")]
    SizeOverflow {
        /// What was being computed when the overflow occurred.
        context: &'static str,
    },

    /// Alignment is not a power of two.
    #[error("alignment {align} is not a power of two")]
    InvalidAlignment {
        /// The offending alignment value.
        align: usize,
    },

    /// Construction or allocation parameters that can never be satisfied.
    #[error("invalid layout: {reason}")]
    InvalidLayout {
        /// Short description of the violated constraint.
        reason: &'static str,
    },

    /// Address does not point into the managed region, or points past the
    /// allocated prefix of it.
    #[error("address {addr:#x} is outside the allocated region")]
    OutOfRange {
        /// The offending address.
        addr: usize,
    },

    /// The block was retired by an earlier resize; its old address is no
    /// longer valid.
    #[error("block was retired by a previous resize and can no longer be used")]
    RetiredBlock,
}

impl AllocError {
    /// Out-of-memory failure for a `size`/`align` request against a region
    /// with `available` bytes left.
    #[inline]
    pub const fn out_of_memory(requested: usize, align: usize, available: usize) -> Self {
        Self::OutOfMemory { requested, align, available }
    }

    /// Overflow while computing `context`.
    #[inline]
    pub const fn size_overflow(context: &'static str) -> Self {
        Self::SizeOverflow { context }
    }

    /// Non-power-of-two alignment.
    #[inline]
    pub const fn invalid_alignment(align: usize) -> Self {
        Self::InvalidAlignment { align }
    }

    /// Impossible layout or construction parameters.
    #[inline]
    pub const fn invalid_layout(reason: &'static str) -> Self {
        Self::InvalidLayout { reason }
    }

    /// Address outside the managed region.
    #[inline]
    pub const fn out_of_range(addr: usize) -> Self {
        Self::OutOfRange { addr }
    }

    /// Checks if this is an out-of-memory error.
    #[inline]
    pub const fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }
}

/// Result type for allocation operations.
pub type AllocResult<T> = Result<T, AllocError>;
