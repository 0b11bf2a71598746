//! Arena allocator configuration.

/// Configuration for [`ArenaAllocator`](super::ArenaAllocator).
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    /// Enable statistics tracking.
    pub track_stats: bool,

    /// Fill pattern applied to memory released by `reset`/`restore` when
    /// debugging. Freshly allocated memory is always zeroed regardless.
    pub dealloc_pattern: Option<u8>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            track_stats: cfg!(debug_assertions),
            dealloc_pattern: if cfg!(debug_assertions) { Some(0xDD) } else { None },
        }
    }
}

impl ArenaConfig {
    /// Production configuration - no tracking, no poison fills.
    pub fn production() -> Self {
        Self { track_stats: false, dealloc_pattern: None }
    }

    /// Debug configuration - full tracking and poison-on-release.
    pub fn debug() -> Self {
        Self { track_stats: true, dealloc_pattern: Some(0xDD) }
    }
}
