//! Write barriers.
//!
//! Storing a white value into a black container would let the value be
//! swept while still referenced. Every reference store made after the
//! container was created goes through one of these.
//!
//! - Tables take the backward barrier: the table turns gray again and is
//!   rescanned in the atomic pass.
//! - Everything else takes the forward barrier: the value is marked at once,
//!   or, once marking is over, the container is whitened so the sweep does
//!   not see a black object pointing at a dead one.

use crate::heap::Heap;
use crate::object::ObjectBody;
use crate::value::{GcRef, Value};

use super::Phase;

impl Heap {
    /// Barrier for a store of `value` into `container`, choosing the
    /// variant by the container's kind.
    pub fn barrier(&mut self, container: GcRef, value: &Value) {
        if matches!(self.objects.get(container).body, ObjectBody::Table(_)) {
            self.barrier_back(container, value);
        } else {
            self.barrier_forward_value(container, value);
        }
    }

    fn is_white_value(&self, value: &Value) -> bool {
        value
            .gc()
            .is_some_and(|r| self.objects.get(r).header.is_white())
    }

    pub(crate) fn barrier_back(&mut self, t: GcRef, value: &Value) {
        if !self.is_white_value(value) {
            return;
        }
        let header = &mut self.objects.get_mut(t).header;
        if !header.is_black() {
            return;
        }
        header.black_to_gray();
        self.gc.gray_again.push(t);
        self.gc.metrics.barriers_backward += 1;
    }

    pub(crate) fn barrier_forward_value(&mut self, container: GcRef, value: &Value) {
        let Some(child) = value.gc() else {
            return;
        };
        if !self.objects.get(child).header.is_white() {
            return;
        }
        let header = self.objects.get(container).header;
        if !header.is_black() || header.is_fixed() {
            return;
        }
        self.gc.metrics.barriers_forward += 1;
        if self.gc.phase == Phase::Propagate {
            self.mark_object(child);
        } else {
            let white = self.gc.current_white;
            self.objects.get_mut(container).header.make_white(white);
        }
    }
}
