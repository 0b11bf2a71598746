//! Pool allocator configuration.

/// Configuration for [`PoolAllocator`](super::PoolAllocator).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Enable statistics tracking.
    pub track_stats: bool,

    /// Fill pattern applied to freed chunks when debugging. Freshly
    /// allocated chunks are always zeroed regardless.
    pub dealloc_pattern: Option<u8>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            track_stats: cfg!(debug_assertions),
            dealloc_pattern: if cfg!(debug_assertions) { Some(0xDD) } else { None },
        }
    }
}

impl PoolConfig {
    /// Production configuration - no tracking, no poison fills.
    pub fn production() -> Self {
        Self { track_stats: false, dealloc_pattern: None }
    }

    /// Debug configuration - full tracking and poison-on-free.
    pub fn debug() -> Self {
        Self { track_stats: true, dealloc_pattern: Some(0xDD) }
    }
}
