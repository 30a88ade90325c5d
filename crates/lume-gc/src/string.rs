//! String interning.
//!
//! Every string in the heap is interned: [`StringTable`] maps content to a
//! single live object, so string equality is handle equality. Buckets are
//! indexed by the low bits of the content hash and the bucket count is
//! always a power of two.
//!
//! Strings live in the same arena as every other object but are not on the
//! collector's root list; the string table is their owning list, and the
//! sweeper walks it one bucket at a time.

use crate::alloc::Accounting;
use crate::arena::Arena;
use crate::header::White;
use crate::value::StrRef;

/// Smallest bucket count the table ever has.
pub const MIN_STRING_TABLE_SIZE: usize = 32;

/// Hash a byte string.
///
/// Long strings are sampled: at most about 32 bytes, taken at a stride
/// proportional to the length, walking backwards from the end.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn hash_bytes(bytes: &[u8]) -> u32 {
    let len = bytes.len();
    let mut h = len as u32;
    let step = (len >> 5) + 1;
    let mut l1 = len;
    while l1 >= step {
        h ^= (h << 5)
            .wrapping_add(h >> 2)
            .wrapping_add(u32::from(bytes[l1 - 1]));
        l1 -= step;
    }
    h
}

/// Outcome of sweeping one bucket.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    pub freed: usize,
    pub bytes: usize,
}

/// Open-hash table of interned strings.
#[derive(Debug)]
pub struct StringTable {
    buckets: Vec<Vec<StrRef>>,
    count: usize,
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StringTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: vec![Vec::new(); MIN_STRING_TABLE_SIZE],
            count: 0,
        }
    }

    /// Number of strings in the table, dead or alive.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn bucket_of(&self, hash: u32) -> usize {
        hash as usize & (self.buckets.len() - 1)
    }

    /// Look up a string by content. Dead strings are returned too; the
    /// caller decides whether to revive them.
    #[must_use]
    pub fn find(&self, arena: &Arena, bytes: &[u8], hash: u32) -> Option<StrRef> {
        self.buckets[self.bucket_of(hash)]
            .iter()
            .copied()
            .find(|s| {
                s.hash() == hash
                    && arena
                        .get(s.gc())
                        .as_string()
                        .is_some_and(|ls| &*ls.bytes == bytes)
            })
    }

    /// Link a freshly allocated string.
    pub fn insert(&mut self, s: StrRef) {
        let b = self.bucket_of(s.hash());
        self.buckets[b].push(s);
        self.count += 1;
    }

    /// Load exceeds one entry per bucket and doubling is still possible.
    #[must_use]
    pub fn wants_grow(&self) -> bool {
        self.count > self.buckets.len() && self.buckets.len() <= (i32::MAX as usize) / 2
    }

    /// Load has dropped below a quarter and the table is above twice the
    /// minimum size.
    #[must_use]
    pub fn wants_shrink(&self) -> bool {
        self.count < self.buckets.len() / 4 && self.buckets.len() > MIN_STRING_TABLE_SIZE * 2
    }

    /// Rehash into `new_size` buckets. The caller must not call this while
    /// the table is being swept.
    pub fn resize(&mut self, new_size: usize) {
        debug_assert!(new_size.is_power_of_two());
        let old = std::mem::replace(&mut self.buckets, vec![Vec::new(); new_size]);
        for s in old.into_iter().flatten() {
            let b = self.bucket_of(s.hash());
            self.buckets[b].push(s);
        }
    }

    /// Free the dead strings of bucket `index` and whiten the survivors.
    pub fn sweep_bucket(
        &mut self,
        index: usize,
        arena: &mut Arena,
        accounting: &mut Accounting,
        current: White,
    ) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        self.buckets[index].retain(|s| {
            let header = &mut arena.get_mut(s.gc()).header;
            if header.is_fixed() {
                return true;
            }
            if header.is_dead(current) {
                let object = arena.remove(s.gc());
                let size = object.size();
                accounting.release(size);
                outcome.freed += 1;
                outcome.bytes += size;
                false
            } else {
                header.make_white(current);
                true
            }
        });
        self.count -= outcome.freed;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{GcObject, LuaString, ObjectBody};

    fn intern(table: &mut StringTable, arena: &mut Arena, bytes: &[u8]) -> StrRef {
        let hash = hash_bytes(bytes);
        if let Some(s) = table.find(arena, bytes, hash) {
            return s;
        }
        let gc = arena.insert(GcObject::new(
            White::Zero,
            ObjectBody::String(LuaString {
                bytes: bytes.into(),
                hash,
            }),
        ));
        let s = StrRef::new(gc, hash);
        table.insert(s);
        s
    }

    #[test]
    fn hash_of_empty_is_zero() {
        assert_eq!(hash_bytes(b""), 0);
    }

    #[test]
    fn hash_samples_long_strings() {
        // A 64-byte string is read at a stride of 3 from the end.
        let a = vec![b'a'; 64];
        let mut b = a.clone();
        b[62] = b'z';
        assert_eq!(hash_bytes(&a), hash_bytes(&b));
        b[63] = b'z';
        assert_ne!(hash_bytes(&a), hash_bytes(&b));
    }

    #[test]
    fn dedup_and_resize() {
        let mut arena = Arena::new();
        let mut table = StringTable::new();
        let mut handles = Vec::new();
        for i in 0..100 {
            handles.push(intern(&mut table, &mut arena, format!("s{i}").as_bytes()));
            if table.wants_grow() {
                let size = table.bucket_count() * 2;
                table.resize(size);
            }
        }
        assert_eq!(table.bucket_count(), 128);
        for (i, h) in handles.iter().enumerate() {
            assert_eq!(intern(&mut table, &mut arena, format!("s{i}").as_bytes()), *h);
        }
        assert_eq!(table.len(), 100);
    }

    #[test]
    fn sweep_frees_only_dead() {
        let mut arena = Arena::new();
        let mut acct = Accounting::new(None);
        let mut table = StringTable::new();
        let s = intern(&mut table, &mut arena, b"x");
        acct.charge(arena.get(s.gc()).size()).unwrap();
        // Created under White::Zero; with White::Zero current it is alive.
        for b in 0..table.bucket_count() {
            table.sweep_bucket(b, &mut arena, &mut acct, White::Zero);
        }
        assert!(arena.contains(s.gc()));
        // After a flip without marking it is dead.
        for b in 0..table.bucket_count() {
            table.sweep_bucket(b, &mut arena, &mut acct, White::One);
        }
        assert!(!arena.contains(s.gc()));
        assert_eq!(acct.total, 0);
        assert!(table.is_empty());
    }
}
