//! Heap consistency checks for tests and debug builds.

use crate::error::InvariantViolation;
use crate::heap::Heap;

use super::Phase;

impl Heap {
    /// Check the collector invariants that must hold between steps.
    ///
    /// - No live object references a freed slot.
    /// - While marking (`Pause` and `Propagate`), no black object
    ///   references a white one.
    /// - While sweeping or finalizing, no live object references one the
    ///   sweep has condemned.
    /// - While propagating, every queued object is gray.
    ///
    /// Objects that are themselves condemned are not checked.
    ///
    /// # Errors
    ///
    /// The first violation found.
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        let white = self.gc.current_white;
        let marking = matches!(self.gc.phase, Phase::Pause | Phase::Propagate);
        let mut found = None;
        for (container, object) in self.objects.iter() {
            if object.header.is_dead(white) {
                continue;
            }
            let black = object.header.is_black();
            object.for_each_child(|child| {
                if found.is_some() {
                    return;
                }
                let Some(target) = self.objects.try_get(child) else {
                    found = Some(InvariantViolation::Dangling { container, child });
                    return;
                };
                if marking {
                    if black && target.header.is_white() {
                        found = Some(InvariantViolation::BlackToWhite { container, child });
                    }
                } else if target.header.is_dead(white) {
                    found = Some(InvariantViolation::DeadReference { container, child });
                }
            });
            if let Some(violation) = found {
                return Err(violation);
            }
        }
        if self.gc.phase == Phase::Propagate {
            let queued = self
                .gc
                .gray
                .iter()
                .chain(&self.gc.gray_again)
                .chain(&self.gc.weak);
            for &object in queued {
                if !self.objects.get(object).header.is_gray() {
                    return Err(InvariantViolation::QueuedNotGray { object });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::GcConfig;
    use crate::error::InvariantViolation;
    use crate::heap::Heap;
    use crate::value::Value;

    #[test]
    fn fresh_heap_is_consistent() {
        let h = Heap::new(GcConfig::default()).unwrap();
        assert_eq!(h.verify(), Ok(()));
    }

    #[test]
    fn consistent_through_a_cycle() {
        let mut h = Heap::new(GcConfig::default()).unwrap();
        let t = h.new_table(0, 0).unwrap();
        h.table_set_str(h.globals(), "t", Value::Table(t)).unwrap();
        h.new_table(0, 0).unwrap();
        loop {
            h.single_step();
            assert_eq!(h.verify(), Ok(()), "in {:?}", h.phase());
            if h.phase() == crate::gc::Phase::Pause {
                break;
            }
        }
    }

    #[test]
    fn dangling_reference_is_reported() {
        let mut h = Heap::new(GcConfig::default()).unwrap();
        let victim = h.new_table(0, 0).unwrap();
        let uv = h.new_upvalue(Value::Table(victim)).unwrap();
        let _ = h.objects.remove(victim);
        assert_eq!(
            h.verify(),
            Err(InvariantViolation::Dangling {
                container: uv,
                child: victim
            })
        );
    }

    #[test]
    fn non_gray_queue_entry_is_reported() {
        let mut h = Heap::new(GcConfig::default()).unwrap();
        h.mark_roots();
        let t = h.new_table(0, 0).unwrap();
        h.gc.gray.push(t);
        assert_eq!(
            h.verify(),
            Err(InvariantViolation::QueuedNotGray { object: t })
        );
    }
}
