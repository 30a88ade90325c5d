//! Driving the phase machine: single units, budgeted steps, full cycles.

use std::time::Instant;

use crate::config::{FINALIZE_COST, STEP_SIZE, SWEEP_COST, SWEEP_MAX};
use crate::heap::Heap;
use crate::metrics::CollectionType;
use crate::object::ObjectBody;

use super::Phase;

impl Heap {
    /// Perform one indivisible unit of collector work and return its cost.
    ///
    /// A unit is: marking the roots, one gray object (or the atomic pass
    /// once the gray list is empty), one string bucket, one sweep batch, or
    /// one finalizer call.
    pub fn single_step(&mut self) -> usize {
        let phase = self.gc.phase;
        let started = Instant::now();
        self.gc.metrics.units += 1;
        let work = match phase {
            Phase::Pause => {
                self.begin_cycle();
                self.mark_roots();
                0
            }
            Phase::Propagate => {
                if self.gc.gray.is_empty() {
                    self.atomic();
                    self.gc.cycle_times.atomic += started.elapsed();
                    return 0;
                }
                self.propagate_mark()
            }
            Phase::SweepStrings => {
                self.sweep_string_step();
                SWEEP_COST
            }
            Phase::Sweep => {
                self.sweep_step();
                SWEEP_MAX * SWEEP_COST
            }
            Phase::Finalize => {
                if self.gc.pending_finalization.is_empty() {
                    self.end_cycle();
                    0
                } else {
                    self.run_one_finalizer();
                    self.accounting.estimate = self
                        .accounting
                        .estimate
                        .checked_sub(FINALIZE_COST)
                        .unwrap_or(self.accounting.estimate);
                    FINALIZE_COST
                }
            }
        };
        self.gc.cycle_times.add(phase, started.elapsed());
        work
    }

    fn begin_cycle(&mut self) {
        self.gc.gc_id = crate::tracing::next_gc_id();
        #[cfg(feature = "tracing")]
        crate::gc::tracing::log_cycle_start(
            self.gc.gc_id,
            self.accounting.total,
            self.accounting.threshold,
        );
    }

    fn end_cycle(&mut self) {
        self.gc.transition_to(Phase::Pause);
        self.accounting.debt = 0;
        let metrics = &mut self.gc.metrics;
        metrics.cycles_completed += 1;
        metrics.last_collection_type = if self.gc.full_requested {
            metrics.full_collections += 1;
            CollectionType::Full
        } else {
            CollectionType::Incremental
        };
        metrics.last_cycle = std::mem::take(&mut self.gc.cycle_times);
    }

    /// Call the finalizer of the oldest pending userdata, after putting it
    /// back on the root list as an ordinary white object.
    fn run_one_finalizer(&mut self) {
        let Some(u) = self.gc.pending_finalization.pop_front() else {
            return;
        };
        self.gc.root_list.push(u);
        let white = self.gc.current_white;
        let object = self.objects.get_mut(u);
        if !object.header.is_white() {
            object.header.make_white(white);
        }
        let finalizer = match &mut object.body {
            ObjectBody::Userdata(ud) => ud.finalizer.take(),
            _ => None,
        };
        let Some(finalizer) = finalizer else {
            return;
        };
        #[cfg(feature = "tracing")]
        crate::gc::tracing::log_finalizer(
            self.gc.gc_id,
            u.index(),
            self.gc.pending_finalization.len(),
        );
        let outer = std::mem::replace(&mut self.gc.in_finalizer, true);
        finalizer(self, u);
        self.gc.in_finalizer = outer;
        self.gc.metrics.finalizers_run += 1;
    }

    fn set_threshold(&mut self) {
        let pause = self.gc.config.pause as usize;
        self.accounting.threshold = (self.accounting.estimate / 100) * pause;
    }

    /// One budgeted collector step, sized by the step multiplier and the
    /// bytes allocated since the threshold was last set.
    pub fn step(&mut self) {
        self.gc.metrics.steps += 1;
        let mut budget = (STEP_SIZE / 100) * self.gc.config.step_multiplier as usize;
        if budget == 0 {
            budget = usize::MAX / 2;
        }
        #[cfg(feature = "tracing")]
        let _span = crate::tracing::internal::trace_gc_step(self.gc.gc_id, budget);
        self.accounting.debt = self
            .accounting
            .debt
            .saturating_add(self.accounting.total.saturating_sub(self.accounting.threshold));
        loop {
            let work = self.single_step();
            if self.gc.phase == Phase::Pause {
                break;
            }
            match budget.checked_sub(work) {
                Some(rest) if rest > 0 => budget = rest,
                _ => break,
            }
        }
        if self.gc.phase == Phase::Pause {
            self.set_threshold();
        } else if self.accounting.debt < STEP_SIZE {
            self.accounting.threshold = self.accounting.total + STEP_SIZE;
        } else {
            self.accounting.debt -= STEP_SIZE;
            self.accounting.threshold = self.accounting.total;
        }
    }

    /// Allocation hook: step the collector if the heap has grown past its
    /// threshold. Does nothing while a finalizer is running.
    pub fn check_gc(&mut self) {
        if !self.gc.in_finalizer && self.accounting.total >= self.accounting.threshold {
            self.step();
        }
    }

    /// Run a complete cycle from wherever the collector is, ending in
    /// `Pause`. Unreachable objects at the time of the call are freed, and
    /// unreachable userdata have their finalizers run.
    pub fn full_gc(&mut self) {
        #[cfg(feature = "tracing")]
        let _span = crate::tracing::internal::trace_gc_collection(
            "full",
            crate::tracing::next_gc_id(),
        );
        if matches!(self.gc.phase, Phase::Pause | Phase::Propagate) {
            // Nothing has flipped yet: abandon marking and sweep everything
            // back to white.
            self.gc.sweep_string_cursor = 0;
            self.gc.sweep_cursor = self.gc.root_list.len();
            self.gc.gray.clear();
            self.gc.gray_again.clear();
            self.gc.weak.clear();
            self.gc.transition_to(Phase::SweepStrings);
        }
        while self.gc.phase != Phase::Finalize {
            self.single_step();
        }
        self.gc.full_requested = true;
        self.begin_cycle();
        self.mark_roots();
        while self.gc.phase != Phase::Pause {
            self.single_step();
        }
        self.gc.full_requested = false;
        self.set_threshold();
    }

    /// Run every outstanding finalizer, then drop the heap.
    ///
    /// Every userdata that has a finalizer and has not been finalized gets
    /// it called once, reachable or not.
    pub fn close(mut self) {
        self.separate_userdata(true);
        self.gc.in_finalizer = true;
        while !self.gc.pending_finalization.is_empty() {
            self.run_one_finalizer();
            // Finalizers may create userdata with finalizers of their own.
            if self.gc.pending_finalization.is_empty() {
                self.separate_userdata(true);
            }
        }
    }
}
