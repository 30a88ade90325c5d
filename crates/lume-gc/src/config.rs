//! Collector tunables.

/// Default pause: wait until the heap doubles before the next cycle.
pub const DEFAULT_PAUSE: u32 = 200;
/// Default step multiplier: collect twice as fast as the mutator allocates.
pub const DEFAULT_STEP_MULTIPLIER: u32 = 200;

/// Bytes of allocation that buy one collector step.
pub const STEP_SIZE: usize = 1024;
/// Objects visited per sweep unit.
pub const SWEEP_MAX: usize = 40;
/// Work units charged per object swept.
pub const SWEEP_COST: usize = 10;
/// Work units charged per finalizer run.
pub const FINALIZE_COST: usize = 100;

/// Configuration of one [`Heap`](crate::Heap).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcConfig {
    /// Percentage of the live estimate to wait for before a new cycle
    /// starts. 100 starts the next cycle immediately.
    pub pause: u32,
    /// Collector speed relative to allocation, as a percentage. 0 means
    /// unlimited: every step finishes the cycle.
    pub step_multiplier: u32,
    /// Hard cap on accounted bytes; allocations past it fail.
    pub memory_limit: Option<usize>,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            pause: DEFAULT_PAUSE,
            step_multiplier: DEFAULT_STEP_MULTIPLIER,
            memory_limit: None,
        }
    }
}

impl GcConfig {
    /// Set [`GcConfig::pause`].
    #[must_use]
    pub const fn with_pause(mut self, pause: u32) -> Self {
        self.pause = pause;
        self
    }

    /// Set [`GcConfig::step_multiplier`].
    #[must_use]
    pub const fn with_step_multiplier(mut self, step_multiplier: u32) -> Self {
        self.step_multiplier = step_multiplier;
        self
    }

    /// Cap the heap at `limit` accounted bytes.
    #[must_use]
    pub const fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = Some(limit);
        self
    }
}
