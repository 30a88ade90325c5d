//! Property tests for tables, interning and collection completeness.

use std::collections::{HashMap, HashSet};

use lume_gc::{GcConfig, GcRef, Heap, Phase, Value};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Key {
    Int(i32),
    Float(i32),
    Str(u8),
    Bool(bool),
}

fn key_strategy() -> impl Strategy<Value = Key> {
    prop_oneof![
        (-5..80i32).prop_map(Key::Int),
        (0..40i32).prop_map(Key::Float),
        any::<u8>().prop_map(Key::Str),
        any::<bool>().prop_map(Key::Bool),
    ]
}

fn key_value(h: &mut Heap, key: Key) -> Value {
    match key {
        Key::Int(i) => Value::from(i),
        Key::Float(i) => Value::Number(f64::from(i) + 0.25),
        Key::Str(s) => Value::String(h.intern(format!("k{s}").as_bytes()).unwrap()),
        Key::Bool(b) => Value::Boolean(b),
    }
}

#[derive(Debug, Clone)]
enum Op {
    /// Allocate a table and link it under `parent` (an index into the
    /// tables allocated so far, or the globals when out of range).
    Alloc { parent: usize },
    /// Drop the link from `parent` to its child.
    Unlink { parent: usize },
    /// Point `from`'s `"peer"` field at `to`.
    Link { from: usize, to: usize },
    /// Run one unit of collector work.
    Step,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..64usize).prop_map(|parent| Op::Alloc { parent }),
        1 => (0..64usize).prop_map(|parent| Op::Unlink { parent }),
        2 => (0..64usize, 0..64usize).prop_map(|(from, to)| Op::Link { from, to }),
        4 => Just(Op::Step),
    ]
}

/// Tables reachable from the globals table.
fn reachable(h: &Heap) -> HashSet<GcRef> {
    let mut seen = HashSet::new();
    let mut stack = vec![h.globals()];
    while let Some(t) = stack.pop() {
        if !seen.insert(t) {
            continue;
        }
        let mut key = Value::Nil;
        while let Some((k, v)) = h.table_next(t, &key).unwrap() {
            if let Some(child) = v.as_table() {
                stack.push(child);
            }
            key = k;
        }
    }
    seen
}

proptest! {
    #[test]
    fn table_matches_model(ops in prop::collection::vec((key_strategy(), prop::option::of(any::<i32>())), 0..300)) {
        let mut h = Heap::new(GcConfig::default()).unwrap();
        let t = h.new_table(0, 0).unwrap();
        h.push(Value::Table(t)).unwrap();
        let mut model: HashMap<Key, i32> = HashMap::new();

        for (key, value) in ops {
            let k = key_value(&mut h, key);
            match value {
                Some(v) => {
                    h.table_set(t, k, Value::from(v)).unwrap();
                    model.insert(key, v);
                }
                None => {
                    h.table_set(t, k, Value::Nil).unwrap();
                    model.remove(&key);
                }
            }
        }

        prop_assert!(h.table(t).chains_consistent());
        for (&key, &v) in &model {
            let k = key_value(&mut h, key);
            prop_assert_eq!(h.table_get(t, &k), Value::from(v));
        }

        let mut visited = 0;
        let mut key = Value::Nil;
        while let Some((k, _)) = h.table_next(t, &key).unwrap() {
            visited += 1;
            key = k;
        }
        prop_assert_eq!(visited, model.len());

        let n = h.table_length(t);
        if n > 0 {
            prop_assert!(model.contains_key(&Key::Int(i32::try_from(n).unwrap())));
        }
        prop_assert!(!model.contains_key(&Key::Int(i32::try_from(n + 1).unwrap())));
    }

    #[test]
    fn interning_deduplicates(words in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..40), 1..60)) {
        let mut h = Heap::new(GcConfig::default()).unwrap();
        let mut by_content = HashMap::new();
        for w in &words {
            let s = h.intern(w).unwrap();
            prop_assert_eq!(h.str_bytes(s), &w[..]);
            let first = *by_content.entry(w.clone()).or_insert(s);
            prop_assert_eq!(first, s);
        }
        let distinct: HashSet<_> = by_content.values().copied().collect();
        prop_assert_eq!(distinct.len(), by_content.len());
    }

    #[test]
    fn collection_is_complete_and_invariant_holds(ops in prop::collection::vec(op_strategy(), 0..400)) {
        let mut h = Heap::new(GcConfig::default()).unwrap();
        let mut tables: Vec<GcRef> = Vec::new();

        for op in ops {
            // The mutator can only reach what the roots reach.
            let roots = reachable(&h);
            let live: Vec<GcRef> = tables.iter().copied().filter(|t| roots.contains(t)).collect();
            let pick = |i: usize| live.get(i % live.len().max(1)).copied();
            match op {
                Op::Alloc { parent } => {
                    let parent = pick(parent).unwrap_or_else(|| h.globals());
                    let t = h.new_table(0, 0).unwrap();
                    h.table_set_str(parent, "child", Value::Table(t)).unwrap();
                    tables.push(t);
                }
                Op::Unlink { parent } => {
                    if let Some(parent) = pick(parent) {
                        h.table_set_str(parent, "child", Value::Nil).unwrap();
                    }
                }
                Op::Link { from, to } => {
                    if let (Some(from), Some(to)) = (pick(from), pick(to)) {
                        h.table_set_str(from, "peer", Value::Table(to)).unwrap();
                    }
                }
                Op::Step => {
                    h.single_step();
                }
            }
            prop_assert_eq!(h.verify(), Ok(()), "in {:?}", h.phase());
        }

        // Only the globals table anchors anything.
        h.full_gc();
        prop_assert_eq!(h.phase(), Phase::Pause);
        let expected = reachable(&h);
        for &t in &tables {
            prop_assert_eq!(h.contains(t), expected.contains(&t), "{:?}", t);
        }
        prop_assert_eq!(h.verify(), Ok(()));
    }
}
