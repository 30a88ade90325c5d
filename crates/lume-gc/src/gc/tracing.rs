//! Collector-level tracing events.

#[cfg(feature = "tracing")]
use crate::gc::Phase;
#[cfg(feature = "tracing")]
use crate::tracing::GcId;

/// Log a phase transition.
#[cfg(feature = "tracing")]
pub fn log_phase_transition(from: Phase, to: Phase, gc_id: GcId) {
    tracing::debug!(
        from = from.name(),
        to = to.name(),
        gc_id = gc_id.0,
        "phase_transition"
    );
}

/// Log the start of a cycle.
#[cfg(feature = "tracing")]
pub fn log_cycle_start(gc_id: GcId, total_bytes: usize, threshold: usize) {
    tracing::debug!(gc_id = gc_id.0, total_bytes, threshold, "cycle_start");
}

/// Log the outcome of the atomic pass.
#[cfg(feature = "tracing")]
pub fn log_atomic(gc_id: GcId, weak_tables: usize, separated: usize, estimate: usize) {
    tracing::debug!(
        gc_id = gc_id.0,
        weak_tables,
        separated,
        estimate,
        "atomic"
    );
}

/// Log the end of the root-list sweep.
#[cfg(feature = "tracing")]
pub fn log_sweep_done(gc_id: GcId, objects_freed: usize, bytes_freed: usize) {
    tracing::debug!(gc_id = gc_id.0, objects_freed, bytes_freed, "sweep_done");
}

/// Log a finalizer call.
#[cfg(feature = "tracing")]
pub fn log_finalizer(gc_id: GcId, index: u32, remaining: usize) {
    tracing::debug!(gc_id = gc_id.0, udata = index, remaining, "finalizer");
}
