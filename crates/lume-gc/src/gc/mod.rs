//! The incremental collector.
//!
//! A cycle runs through the phases of [`Phase`], one bounded unit of work
//! per [`Heap::single_step`](crate::Heap::single_step):
//!
//! - `Propagate` drains the gray list one object at a time, then runs the
//!   atomic pass that rescans threads and barrier-hit tables, clears weak
//!   entries, separates finalizable userdata and flips the current white.
//! - `SweepStrings` and `Sweep` free objects of the previous white and
//!   whiten the survivors.
//! - `Finalize` calls one pending finalizer per step.
//!
//! Write barriers keep the mutator from hiding white objects behind black
//! ones while a cycle is in progress.

mod barrier;
mod collector;
mod mark;
mod state;
mod sweep;
pub(crate) mod tracing;
mod verify;

pub use state::{GcState, Phase};
