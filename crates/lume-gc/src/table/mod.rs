//! Hybrid array/hash tables.
//!
//! A [`Table`] keeps integer keys `1..=n` in a dense array part and every
//! other key in a power-of-two hash part. The hash part uses chained
//! scatter with Brent's variation: a key that collides with a node sitting
//! outside its own main position evicts that node, so every chain starts at
//! the main position of the keys on it.
//!
//! When the hash part runs out of free nodes the whole table is rehashed:
//! the integer keys are counted per power-of-two slice and the array part is
//! sized to the largest `n` that would be more than half full.
//!
//! Tables do no barrier work themselves. The heap applies the backward
//! barrier after every write it routes through [`Table::slot_for`].

mod hash;

use std::mem::size_of;

use crate::alloc::Accounting;
use crate::error::{Error, Result};
use crate::value::{GcRef, StrRef, Value};

pub use hash::{array_index, ceil_log2, compute_sizes, main_position, MAXASIZE, MAXBITS};

/// One entry of the hash part.
///
/// A node is free when its key is nil. A node whose value is nil but whose
/// key is set is a removed entry: its key is kept so iteration can resume
/// from it, but it no longer keeps anything alive.
#[derive(Debug, Clone, Copy)]
pub struct Node {
    pub key: Value,
    pub value: Value,
    next: Option<u32>,
}

impl Node {
    const EMPTY: Self = Self {
        key: Value::Nil,
        value: Value::Nil,
        next: None,
    };
}

// Stands in for the hash part of a table that has none. Only ever read.
static DUMMY_NODE: Node = Node::EMPTY;

/// Location of a value inside a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Zero-based position in the array part.
    Array(usize),
    /// Position in the hash part.
    Node(usize),
}

/// A Lua-style table.
#[derive(Debug, Clone)]
pub struct Table {
    array: Vec<Value>,
    nodes: Vec<Node>,
    last_free: usize,
    /// Metatable, if any. Writes must go through the heap's barrier.
    pub metatable: Option<GcRef>,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            array: Vec::new(),
            nodes: Vec::new(),
            last_free: 0,
            metatable: None,
        }
    }
}

fn hash_part_size(nhash: usize) -> Result<usize> {
    if nhash == 0 {
        return Ok(0);
    }
    let lsize = ceil_log2(nhash);
    if lsize > MAXBITS {
        return Err(Error::TableOverflow);
    }
    Ok(1 << lsize)
}

#[allow(clippy::cast_precision_loss)]
fn int_key(k: usize) -> Value {
    Value::Number(k as f64)
}

impl Table {
    /// A table with room for `narray` array entries and at least `nhash`
    /// hash entries.
    ///
    /// # Errors
    ///
    /// [`Error::TableOverflow`] if either part would exceed the maximum size.
    pub fn new(narray: usize, nhash: usize) -> Result<Self> {
        if narray > MAXASIZE {
            return Err(Error::TableOverflow);
        }
        let hsize = hash_part_size(nhash)?;
        Ok(Self {
            array: vec![Value::Nil; narray],
            nodes: vec![Node::EMPTY; hsize],
            last_free: hsize,
            metatable: None,
        })
    }

    /// Length of the array part.
    #[must_use]
    pub fn array_size(&self) -> usize {
        self.array.len()
    }

    /// Number of nodes in the hash part; 0 when it is the shared dummy.
    #[must_use]
    pub fn node_capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Bytes held by both parts.
    #[must_use]
    pub fn storage_bytes(&self) -> usize {
        self.array.len() * size_of::<Value>() + self.nodes.len() * size_of::<Node>()
    }

    #[must_use]
    pub fn array(&self) -> &[Value] {
        &self.array
    }

    /// Keys and values of the occupied hash nodes, removed entries included.
    pub fn node_entries(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.nodes
            .iter()
            .filter(|n| !n.key.is_nil())
            .map(|n| (&n.key, &n.value))
    }

    fn hash_size(&self) -> usize {
        self.nodes.len().max(1)
    }

    fn node(&self, i: usize) -> &Node {
        if self.nodes.is_empty() {
            &DUMMY_NODE
        } else {
            &self.nodes[i]
        }
    }

    fn main_position(&self, key: &Value) -> usize {
        main_position(key, self.hash_size())
    }

    fn chain_find(&self, mut i: usize, matches: impl Fn(&Value) -> bool) -> Option<usize> {
        loop {
            let node = self.node(i);
            if matches(&node.key) {
                return Some(i);
            }
            i = node.next? as usize;
        }
    }

    /// Raw lookup. Absent keys read as nil.
    #[must_use]
    pub fn get(&self, key: &Value) -> Value {
        match *key {
            Value::Nil => Value::Nil,
            Value::String(s) => self.get_str(s),
            Value::Number(_) => match array_index(key) {
                Some(k) => self.get_int(i64::from(k)),
                None => self.get_generic(key),
            },
            _ => self.get_generic(key),
        }
    }

    /// Lookup by integer key.
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn get_int(&self, k: i64) -> Value {
        if k >= 1 && (k as u64) <= self.array.len() as u64 {
            return self.array[k as usize - 1];
        }
        #[allow(clippy::cast_precision_loss)]
        let key = Value::Number(k as f64);
        self.get_generic(&key)
    }

    /// Lookup by interned string.
    #[must_use]
    pub fn get_str(&self, s: StrRef) -> Value {
        let key = Value::String(s);
        self.chain_find(self.main_position(&key), |k| *k == key)
            .map_or(Value::Nil, |i| self.node(i).value)
    }

    fn get_generic(&self, key: &Value) -> Value {
        self.chain_find(self.main_position(key), |k| k == key)
            .map_or(Value::Nil, |i| self.node(i).value)
    }

    /// Where `key` currently lives, if it has a slot.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn find_slot(&self, key: &Value) -> Option<Slot> {
        if key.is_nil() {
            return None;
        }
        if let Some(k) = array_index(key) {
            if k >= 1 && (k as usize) <= self.array.len() {
                return Some(Slot::Array(k as usize - 1));
            }
        }
        self.chain_find(self.main_position(key), |k| k == key)
            .map(Slot::Node)
    }

    /// Value stored in `slot`.
    #[must_use]
    pub fn slot_value(&self, slot: Slot) -> Value {
        match slot {
            Slot::Array(i) => self.array[i],
            Slot::Node(i) => self.nodes[i].value,
        }
    }

    /// Mutable access to the value in `slot`.
    pub fn slot_mut(&mut self, slot: Slot) -> &mut Value {
        match slot {
            Slot::Array(i) => &mut self.array[i],
            Slot::Node(i) => &mut self.nodes[i].value,
        }
    }

    /// The slot for `key`, creating it if absent. A new slot holds nil.
    ///
    /// Creating a slot may rehash the table, charging or releasing the
    /// difference in storage to `acct`.
    ///
    /// # Errors
    ///
    /// [`Error::NilIndex`] and [`Error::NanIndex`] for keys that can never
    /// be stored; [`Error::TableOverflow`] and [`Error::OutOfMemory`] if a
    /// needed rehash fails, in which case the table is unchanged.
    pub fn slot_for(&mut self, key: Value, acct: &mut Accounting) -> Result<Slot> {
        if let Some(slot) = self.find_slot(&key) {
            return Ok(slot);
        }
        match key {
            Value::Nil => Err(Error::NilIndex),
            Value::Number(n) if n.is_nan() => Err(Error::NanIndex),
            _ => self.new_key(key, acct),
        }
    }

    /// Raw assignment. Assigning nil to an absent key creates nothing.
    ///
    /// # Errors
    ///
    /// As for [`Table::slot_for`].
    pub fn set(&mut self, key: Value, value: Value, acct: &mut Accounting) -> Result<()> {
        if value.is_nil() {
            match key {
                Value::Nil => return Err(Error::NilIndex),
                Value::Number(n) if n.is_nan() => return Err(Error::NanIndex),
                _ => {}
            }
            if let Some(slot) = self.find_slot(&key) {
                *self.slot_mut(slot) = Value::Nil;
            }
            return Ok(());
        }
        let slot = self.slot_for(key, acct)?;
        *self.slot_mut(slot) = value;
        Ok(())
    }

    fn get_free_pos(&mut self) -> Option<usize> {
        while self.last_free > 0 {
            self.last_free -= 1;
            if self.nodes[self.last_free].key.is_nil() {
                return Some(self.last_free);
            }
        }
        None
    }

    // Insert a key known to be absent.
    #[allow(clippy::cast_possible_truncation)]
    fn new_key(&mut self, key: Value, acct: &mut Accounting) -> Result<Slot> {
        let mut mp = self.main_position(&key);
        if self.nodes.is_empty() || !self.nodes[mp].value.is_nil() {
            let Some(free) = self.get_free_pos() else {
                self.rehash(&key, acct)?;
                return self.slot_for(key, acct);
            };
            let other = self.main_position(&self.nodes[mp].key);
            if other == mp {
                // Occupant is home: chain the new key after it.
                self.nodes[free].next = self.nodes[mp].next;
                self.nodes[mp].next = Some(free as u32);
                mp = free;
            } else {
                // Occupant is a displaced chain member: move it out.
                let mut prev = other;
                while self.nodes[prev].next != Some(mp as u32) {
                    let Some(n) = self.nodes[prev].next else {
                        unreachable!("node {mp} missing from the chain of {other}");
                    };
                    prev = n as usize;
                }
                self.nodes[prev].next = Some(free as u32);
                self.nodes[free] = self.nodes[mp];
                self.nodes[mp].next = None;
                self.nodes[mp].value = Value::Nil;
            }
        }
        self.nodes[mp].key = key;
        Ok(Slot::Node(mp))
    }

    fn num_use_array(&self, nums: &mut [usize; MAXBITS + 1]) -> usize {
        let mut used = 0;
        let mut i = 1;
        let mut ttlg = 1;
        for slice in nums.iter_mut() {
            let lim = ttlg.min(self.array.len());
            if i > lim {
                break;
            }
            let count = self.array[i - 1..lim].iter().filter(|v| !v.is_nil()).count();
            *slice += count;
            used += count;
            i = lim + 1;
            ttlg *= 2;
        }
        used
    }

    fn num_use_hash(&self, nums: &mut [usize; MAXBITS + 1], narray: &mut usize) -> usize {
        let mut total = 0;
        for node in self.nodes.iter().rev().filter(|n| !n.value.is_nil()) {
            *narray += hash::count_int(&node.key, nums);
            total += 1;
        }
        total
    }

    fn rehash(&mut self, extra: &Value, acct: &mut Accounting) -> Result<()> {
        let mut nums = [0; MAXBITS + 1];
        let mut narray = self.num_use_array(&mut nums);
        let mut total = narray;
        total += self.num_use_hash(&mut nums, &mut narray);
        narray += hash::count_int(extra, &mut nums);
        total += 1;
        let (asize, in_array) = compute_sizes(&nums, narray);
        self.resize(asize, total - in_array, acct)
    }

    /// Rebuild with an array part of `nasize` and room for `nhsize` hash
    /// entries, moving entries between the parts as needed.
    ///
    /// # Errors
    ///
    /// [`Error::TableOverflow`] or [`Error::OutOfMemory`]; the table is left
    /// untouched in both cases.
    pub fn resize(&mut self, nasize: usize, nhsize: usize, acct: &mut Accounting) -> Result<()> {
        if nasize > MAXASIZE {
            return Err(Error::TableOverflow);
        }
        let hsize = hash_part_size(nhsize)?;
        let new_bytes = nasize * size_of::<Value>() + hsize * size_of::<Node>();
        acct.realloc(self.storage_bytes(), new_bytes)?;

        let old_asize = self.array.len();
        if nasize > old_asize {
            self.array.resize(nasize, Value::Nil);
        }
        let old_nodes = std::mem::replace(&mut self.nodes, vec![Node::EMPTY; hsize]);
        self.last_free = hsize;
        if nasize < old_asize {
            let spilled: Vec<Value> = self.array.drain(nasize..).collect();
            self.array.shrink_to_fit();
            for (i, value) in spilled.into_iter().enumerate() {
                if !value.is_nil() {
                    let slot = self.slot_for(int_key(nasize + i + 1), acct)?;
                    *self.slot_mut(slot) = value;
                }
            }
        }
        for node in old_nodes.into_iter().rev() {
            if !node.value.is_nil() {
                let slot = self.slot_for(node.key, acct)?;
                *self.slot_mut(slot) = node.value;
            }
        }
        Ok(())
    }

    /// Resize the array part to `nasize`, keeping the hash part's size.
    ///
    /// # Errors
    ///
    /// As for [`Table::resize`].
    pub fn resize_array(&mut self, nasize: usize, acct: &mut Accounting) -> Result<()> {
        let nhsize = self.nodes.len();
        self.resize(nasize, nhsize, acct)
    }

    // Position after which iteration resumes: 0 to start, k for array key
    // k, and array size + node index + 1 for a hash key.
    #[allow(clippy::cast_sign_loss)]
    fn find_index(&self, key: &Value) -> Result<usize> {
        if key.is_nil() {
            return Ok(0);
        }
        if let Some(k) = array_index(key) {
            if k >= 1 && (k as usize) <= self.array.len() {
                return Ok(k as usize);
            }
        }
        self.chain_find(self.main_position(key), |k| k == key)
            .filter(|_| !self.nodes.is_empty())
            .map(|i| self.array.len() + i + 1)
            .ok_or(Error::InvalidNextKey)
    }

    /// The entry after `key` in traversal order, or `None` at the end.
    /// Pass nil to start. Array entries come first, in index order.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidNextKey`] if `key` is not in the table.
    pub fn next(&self, key: &Value) -> Result<Option<(Value, Value)>> {
        let start = self.find_index(key)?;
        let asize = self.array.len();
        for i in start..asize {
            if !self.array[i].is_nil() {
                return Ok(Some((int_key(i + 1), self.array[i])));
            }
        }
        let first_node = start.saturating_sub(asize);
        Ok(self
            .nodes
            .iter()
            .skip(first_node)
            .find(|n| !n.value.is_nil())
            .map(|n| (n.key, n.value)))
    }

    /// A border: an index `i` with `t[i]` non-nil and `t[i + 1]` nil, or 0
    /// if `t[1]` is nil. Any border may be returned when there are holes.
    #[must_use]
    pub fn length(&self) -> usize {
        let mut j = self.array.len();
        if j > 0 && self.array[j - 1].is_nil() {
            let mut i = 0;
            while j - i > 1 {
                let m = (i + j) / 2;
                if self.array[m - 1].is_nil() {
                    j = m;
                } else {
                    i = m;
                }
            }
            return i;
        }
        if self.nodes.is_empty() {
            return j;
        }
        self.unbound_search(j)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn unbound_search(&self, start: usize) -> usize {
        let present = |k: usize| !self.get_int(k as i64).is_nil();
        let mut i = start;
        let mut j = start + 1;
        while present(j) {
            i = j;
            j *= 2;
            if j > i32::MAX as usize {
                // Pathological table; fall back to a linear scan.
                let mut k = 1;
                while present(k) {
                    k += 1;
                }
                return k - 1;
            }
        }
        while j - i > 1 {
            let m = (i + j) / 2;
            if present(m) {
                i = m;
            } else {
                j = m;
            }
        }
        i
    }

    /// Check the chain structure of the hash part: every live key is
    /// reachable from its main position, and every chain is acyclic.
    #[must_use]
    pub fn chains_consistent(&self) -> bool {
        let mut live = self.nodes.iter().filter(|n| !n.value.is_nil());
        live.all(|n| {
            let mut i = self.main_position(&n.key);
            for _ in 0..=self.nodes.len() {
                let node = &self.nodes[i];
                if node.key == n.key {
                    return true;
                }
                match node.next {
                    Some(next) => i = next as usize,
                    None => return false,
                }
            }
            false
        })
    }

    /// Clear the value at `slot`. Used when a weak entry dies.
    pub(crate) fn clear_slot(&mut self, slot: Slot) {
        *self.slot_mut(slot) = Value::Nil;
    }

    /// Slots of every non-nil entry, array part first.
    pub(crate) fn live_slots(&self) -> impl Iterator<Item = (Slot, Value, Value)> + '_ {
        let array = self
            .array
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nil())
            .map(|(i, v)| (Slot::Array(i), int_key(i + 1), *v));
        let nodes = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.value.is_nil())
            .map(|(i, n)| (Slot::Node(i), n.key, n.value));
        array.chain(nodes)
    }
}
