//! Generational slot arena holding every collectable object.
//!
//! Objects never move while alive: a [`GcRef`] stays valid until the
//! sweeper frees the slot. Freed slots are recycled through a free list and
//! get a new generation, so a stale handle is detected on access.

use crate::object::GcObject;
use crate::value::GcRef;

#[derive(Debug)]
struct Slot {
    generation: u32,
    object: Option<GcObject>,
}

/// Slot storage for [`GcObject`]s.
#[derive(Debug, Default)]
pub struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Arena {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Number of live objects.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.live
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Store `object` and return its handle.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` slots would be needed.
    pub fn insert(&mut self, object: GcObject) -> GcRef {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.object.is_none());
            slot.object = Some(object);
            return GcRef::new(index, slot.generation);
        }
        let index = u32::try_from(self.slots.len()).expect("arena index space exhausted");
        self.slots.push(Slot {
            generation: 0,
            object: Some(object),
        });
        GcRef::new(index, 0)
    }

    /// The object behind `r`, or `None` if it has been freed.
    #[must_use]
    pub fn try_get(&self, r: GcRef) -> Option<&GcObject> {
        self.slots
            .get(r.index() as usize)
            .filter(|s| s.generation == r.generation())
            .and_then(|s| s.object.as_ref())
    }

    #[must_use]
    pub fn contains(&self, r: GcRef) -> bool {
        self.try_get(r).is_some()
    }

    /// # Panics
    ///
    /// Panics on a stale handle; that is a broken heap invariant.
    #[must_use]
    pub fn get(&self, r: GcRef) -> &GcObject {
        match self.try_get(r) {
            Some(o) => o,
            None => panic!("stale object handle {r:?}"),
        }
    }

    /// # Panics
    ///
    /// Panics on a stale handle; that is a broken heap invariant.
    pub fn get_mut(&mut self, r: GcRef) -> &mut GcObject {
        match self
            .slots
            .get_mut(r.index() as usize)
            .filter(|s| s.generation == r.generation())
            .and_then(|s| s.object.as_mut())
        {
            Some(o) => o,
            None => panic!("stale object handle {r:?}"),
        }
    }

    /// Free the slot and hand back its object.
    ///
    /// # Panics
    ///
    /// Panics on a stale handle.
    pub fn remove(&mut self, r: GcRef) -> GcObject {
        let slot = &mut self.slots[r.index() as usize];
        assert_eq!(slot.generation, r.generation(), "stale object handle {r:?}");
        let object = slot.object.take().expect("slot already free");
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(r.index());
        self.live -= 1;
        object
    }

    /// Iterate over every live object.
    pub fn iter(&self) -> impl Iterator<Item = (GcRef, &GcObject)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            #[allow(clippy::cast_possible_truncation)]
            s.object
                .as_ref()
                .map(|o| (GcRef::new(i as u32, s.generation), o))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::White;
    use crate::object::{ObjectBody, Upvalue};
    use crate::value::Value;

    fn upvalue() -> GcObject {
        GcObject::new(
            White::Zero,
            ObjectBody::Upvalue(Upvalue { value: Value::Nil }),
        )
    }

    #[test]
    fn removed_slot_is_reused_with_new_generation() {
        let mut arena = Arena::new();
        let a = arena.insert(upvalue());
        arena.remove(a);
        assert!(!arena.contains(a));
        let b = arena.insert(upvalue());
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    #[should_panic(expected = "stale object handle")]
    fn stale_handle_panics() {
        let mut arena = Arena::new();
        let a = arena.insert(upvalue());
        arena.remove(a);
        let _ = arena.insert(upvalue());
        let _ = arena.get(a);
    }

    #[test]
    fn iter_skips_free_slots() {
        let mut arena = Arena::new();
        let a = arena.insert(upvalue());
        let b = arena.insert(upvalue());
        arena.remove(a);
        let live: Vec<_> = arena.iter().map(|(r, _)| r).collect();
        assert_eq!(live, vec![b]);
    }
}
