//! GC metrics and statistics.

use std::time::Duration;

use crate::gc::Phase;

/// Cumulative counters for one heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcMetrics {
    /// Cycles that reached `Pause` again.
    pub cycles_completed: usize,
    /// Of those, cycles driven to completion by [`Heap::full_gc`](crate::Heap::full_gc).
    pub full_collections: usize,
    /// Calls to the budgeted [`Heap::step`](crate::Heap::step).
    pub steps: usize,
    /// Units of work performed (gray pops, buckets, sweep batches, finalizers).
    pub units: usize,
    /// Non-string objects freed.
    pub objects_freed: usize,
    /// Strings freed.
    pub strings_freed: usize,
    /// Bytes released by the sweepers.
    pub bytes_freed: usize,
    /// Finalizers invoked.
    pub finalizers_run: usize,
    /// Forward barriers that had to act.
    pub barriers_forward: usize,
    /// Backward barriers that had to act.
    pub barriers_backward: usize,
    /// How the last completed cycle was driven.
    pub last_collection_type: CollectionType,
    /// Time spent per phase during the last completed cycle.
    pub last_cycle: PhaseTimes,
}

impl Default for GcMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GcMetrics {
    /// Create a new `GcMetrics` with all counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cycles_completed: 0,
            full_collections: 0,
            steps: 0,
            units: 0,
            objects_freed: 0,
            strings_freed: 0,
            bytes_freed: 0,
            finalizers_run: 0,
            barriers_forward: 0,
            barriers_backward: 0,
            last_collection_type: CollectionType::None,
            last_cycle: PhaseTimes::new(),
        }
    }
}

/// How a cycle was driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum CollectionType {
    /// No cycle has completed yet.
    #[default]
    None = 0,
    /// Interleaved with the mutator through threshold-driven steps.
    Incremental = 1,
    /// Completed in one call to `full_gc`.
    Full = 2,
}

/// Time spent in each phase over one cycle.
///
/// Incremental cycles accumulate across many steps; `atomic` is the single
/// non-interruptible pass at the end of marking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTimes {
    /// Root marking plus gray-list propagation.
    pub propagate: Duration,
    /// The atomic pass.
    pub atomic: Duration,
    /// String table sweep.
    pub sweep_strings: Duration,
    /// Root list sweep.
    pub sweep: Duration,
    /// Finalizer calls.
    pub finalize: Duration,
}

impl PhaseTimes {
    /// All durations zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            propagate: Duration::ZERO,
            atomic: Duration::ZERO,
            sweep_strings: Duration::ZERO,
            sweep: Duration::ZERO,
            finalize: Duration::ZERO,
        }
    }

    /// Charge `elapsed` to the phase a unit of work ran in.
    pub fn add(&mut self, phase: Phase, elapsed: Duration) {
        let slot = match phase {
            Phase::Pause | Phase::Propagate => &mut self.propagate,
            Phase::SweepStrings => &mut self.sweep_strings,
            Phase::Sweep => &mut self.sweep,
            Phase::Finalize => &mut self.finalize,
        };
        *slot += elapsed;
    }

    /// Sum over all phases.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.propagate + self.atomic + self.sweep_strings + self.sweep + self.finalize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_times_accumulate() {
        let mut t = PhaseTimes::new();
        t.add(Phase::Pause, Duration::from_millis(1));
        t.add(Phase::Propagate, Duration::from_millis(2));
        t.add(Phase::Sweep, Duration::from_millis(4));
        t.atomic = Duration::from_millis(8);
        assert_eq!(t.propagate, Duration::from_millis(3));
        assert_eq!(t.total(), Duration::from_millis(15));
    }

    #[test]
    fn default_metrics_are_zero() {
        let m = GcMetrics::default();
        assert_eq!(m.cycles_completed, 0);
        assert_eq!(m.last_collection_type, CollectionType::None);
        assert_eq!(m.last_cycle.total(), Duration::ZERO);
    }
}
