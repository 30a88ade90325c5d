//! Collector phase machine and bookkeeping lists.

use std::collections::VecDeque;

use crate::config::GcConfig;
use crate::header::White;
use crate::metrics::{GcMetrics, PhaseTimes};
use crate::tracing::GcId;
use crate::value::GcRef;

/// Collector phase. A cycle runs through them in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Phase {
    /// Between cycles. The next step marks the roots.
    Pause = 0,
    /// Draining the gray list one object per step.
    Propagate = 1,
    /// Sweeping the string table one bucket per step.
    SweepStrings = 2,
    /// Sweeping the root list in batches.
    Sweep = 3,
    /// Running pending finalizers one per step.
    Finalize = 4,
}

impl Phase {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Propagate => "propagate",
            Self::SweepStrings => "sweep_strings",
            Self::Sweep => "sweep",
            Self::Finalize => "finalize",
        }
    }

    /// Whether the collector may move from `self` to `to`.
    ///
    /// Besides the cyclic order, a full collection may abandon a cycle
    /// that has not flipped white yet (straight to sweeping) and may start
    /// marking again from `Finalize` while finalizers are still pending.
    #[must_use]
    pub const fn is_valid_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pause, Self::Propagate | Self::SweepStrings)
                | (Self::Propagate, Self::SweepStrings)
                | (Self::SweepStrings, Self::Sweep)
                | (Self::Sweep, Self::Finalize)
                | (Self::Finalize, Self::Pause | Self::Propagate)
        )
    }
}

/// Per-heap collector state.
#[derive(Debug)]
pub struct GcState {
    pub(crate) phase: Phase,
    pub(crate) current_white: White,
    /// Every collectable except strings, in allocation order modulo sweeping.
    pub(crate) root_list: Vec<GcRef>,
    pub(crate) gray: Vec<GcRef>,
    pub(crate) gray_again: Vec<GcRef>,
    pub(crate) weak: Vec<GcRef>,
    pub(crate) pending_finalization: VecDeque<GcRef>,
    /// Root-list sweep position; entries at or above it have been swept.
    pub(crate) sweep_cursor: usize,
    pub(crate) sweep_string_cursor: usize,
    pub(crate) in_finalizer: bool,
    pub(crate) config: GcConfig,
    pub(crate) metrics: GcMetrics,
    pub(crate) cycle_times: PhaseTimes,
    pub(crate) full_requested: bool,
    pub(crate) gc_id: GcId,
    // Reused by traversal to avoid borrowing the arena while marking.
    pub(crate) scratch: Vec<GcRef>,
}

impl GcState {
    #[must_use]
    pub fn new(config: GcConfig) -> Self {
        Self {
            phase: Phase::Pause,
            current_white: White::Zero,
            root_list: Vec::new(),
            gray: Vec::new(),
            gray_again: Vec::new(),
            weak: Vec::new(),
            pending_finalization: VecDeque::new(),
            sweep_cursor: 0,
            sweep_string_cursor: 0,
            in_finalizer: false,
            config,
            metrics: GcMetrics::new(),
            cycle_times: PhaseTimes::default(),
            full_requested: false,
            gc_id: GcId(0),
            scratch: Vec::new(),
        }
    }

    /// Move to `to`.
    ///
    /// # Panics
    ///
    /// In debug builds, on a transition the phase machine does not allow.
    pub fn transition_to(&mut self, to: Phase) {
        debug_assert!(
            self.phase.is_valid_transition(to),
            "invalid collector transition {:?} -> {:?}",
            self.phase,
            to
        );
        #[cfg(feature = "tracing")]
        crate::gc::tracing::log_phase_transition(self.phase, to, self.gc_id);
        self.phase = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cyclic_order_is_valid() {
        let order = [
            Phase::Pause,
            Phase::Propagate,
            Phase::SweepStrings,
            Phase::Sweep,
            Phase::Finalize,
            Phase::Pause,
        ];
        for w in order.windows(2) {
            assert!(w[0].is_valid_transition(w[1]), "{:?} -> {:?}", w[0], w[1]);
        }
    }

    #[test]
    fn full_collection_shortcuts_are_valid() {
        assert!(Phase::Pause.is_valid_transition(Phase::SweepStrings));
        assert!(Phase::Finalize.is_valid_transition(Phase::Propagate));
    }

    #[test]
    fn backwards_moves_are_invalid() {
        assert!(!Phase::Sweep.is_valid_transition(Phase::Propagate));
        assert!(!Phase::SweepStrings.is_valid_transition(Phase::Pause));
        assert!(!Phase::Propagate.is_valid_transition(Phase::Pause));
        assert!(!Phase::Pause.is_valid_transition(Phase::Sweep));
        assert!(!Phase::Finalize.is_valid_transition(Phase::SweepStrings));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "invalid collector transition")]
    fn transition_to_rejects_invalid_moves() {
        let mut state = GcState::new(GcConfig::default());
        state.transition_to(Phase::Sweep);
    }
}
