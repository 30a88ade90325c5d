//! Weak tables selected through the `__mode` metatable field.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lume_gc::{GcConfig, GcRef, Heap, Phase, Value};

fn heap() -> Heap {
    Heap::new(GcConfig::default()).unwrap()
}

/// A rooted table whose metatable sets `__mode` to `mode`.
fn weak_table(h: &mut Heap, name: &str, mode: &str) -> GcRef {
    let t = h.new_table(0, 0).unwrap();
    h.table_set_str(h.globals(), name, Value::Table(t)).unwrap();
    let mt = h.new_table(0, 0).unwrap();
    let mode = h.intern(mode.as_bytes()).unwrap();
    h.table_set_str(mt, "__mode", Value::String(mode)).unwrap();
    h.set_metatable(&Value::Table(t), Some(mt));
    t
}

fn live_entries(h: &Heap, t: GcRef) -> usize {
    let mut n = 0;
    let mut key = Value::Nil;
    while let Some((k, _)) = h.table_next(t, &key).unwrap() {
        n += 1;
        key = k;
    }
    n
}

#[test]
fn test_weak_values_are_cleared() {
    let mut h = heap();
    let t = weak_table(&mut h, "cache", "v");
    let dropped = h.new_table(0, 0).unwrap();
    let kept = h.new_table(0, 0).unwrap();
    h.push(Value::Table(kept)).unwrap();
    let s = h.intern(b"strings are values").unwrap();
    h.table_set(t, Value::from(1), Value::Table(dropped)).unwrap();
    h.table_set(t, Value::from(2), Value::Table(kept)).unwrap();
    h.table_set(t, Value::from(3), Value::String(s)).unwrap();
    h.table_set_str(t, "named", Value::Table(dropped)).unwrap();

    h.full_gc();

    assert!(!h.contains(dropped));
    assert_eq!(h.table_get(t, &Value::from(1)), Value::Nil);
    assert_eq!(h.table_get_str(t, "named"), Value::Nil);
    assert_eq!(h.table_get(t, &Value::from(2)), Value::Table(kept));
    assert_eq!(h.table_get(t, &Value::from(3)), Value::String(s));
    assert_eq!(h.str_bytes(s), b"strings are values");
    h.verify().unwrap();
}

#[test]
fn test_weak_keys_are_cleared() {
    let mut h = heap();
    let t = weak_table(&mut h, "props", "k");
    let dropped = h.new_table(0, 0).unwrap();
    let kept = h.new_table(0, 0).unwrap();
    h.push(Value::Table(kept)).unwrap();
    let value = h.new_table(0, 0).unwrap();
    h.table_set(t, Value::Table(dropped), Value::Boolean(true))
        .unwrap();
    h.table_set(t, Value::Table(kept), Value::Table(value)).unwrap();

    h.full_gc();

    assert!(!h.contains(dropped));
    assert_eq!(live_entries(&h, t), 1);
    // Values of a weak-keyed table are strong.
    assert!(h.contains(value));
    assert_eq!(h.table_get(t, &Value::Table(kept)), Value::Table(value));
    h.verify().unwrap();
}

#[test]
fn test_weak_keys_and_values() {
    let mut h = heap();
    let t = weak_table(&mut h, "both", "kv");
    let a = h.new_table(0, 0).unwrap();
    let b = h.new_table(0, 0).unwrap();
    h.push(Value::Table(a)).unwrap();
    h.table_set(t, Value::Table(a), Value::Table(b)).unwrap();
    h.table_set(t, Value::Table(b), Value::Table(a)).unwrap();

    h.full_gc();

    // `b` is only weakly referenced, so both entries involving it die.
    assert!(!h.contains(b));
    assert!(h.contains(a));
    assert_eq!(live_entries(&h, t), 0);
}

#[test]
fn test_strong_table_keeps_entries() {
    let mut h = heap();
    let t = weak_table(&mut h, "strong", "");
    let v = h.new_table(0, 0).unwrap();
    h.table_set(t, Value::from(1), Value::Table(v)).unwrap();
    h.full_gc();
    assert!(h.contains(v));
    assert_eq!(live_entries(&h, t), 1);
}

#[test]
fn test_finalized_userdata_in_weak_tables() {
    let mut h = heap();
    let values = weak_table(&mut h, "values", "v");
    let keys = weak_table(&mut h, "keys", "k");
    let ran = Arc::new(AtomicBool::new(false));
    let ud = h.new_userdata(vec![7u8], None).unwrap();
    let ran_in = Arc::clone(&ran);
    h.set_finalizer(
        ud,
        Box::new(move |_: &mut Heap, _: GcRef| ran_in.store(true, Ordering::SeqCst)),
    );
    h.table_set(values, Value::from(1), Value::Userdata(ud)).unwrap();
    h.table_set(keys, Value::Userdata(ud), Value::Boolean(true))
        .unwrap();

    h.full_gc();

    assert!(ran.load(Ordering::SeqCst));
    // Removed from weak values before the finalizer runs, but still usable
    // as a weak key while it is being finalized.
    assert_eq!(h.table_get(values, &Value::from(1)), Value::Nil);
    assert_eq!(
        h.table_get(keys, &Value::Userdata(ud)),
        Value::Boolean(true)
    );

    h.full_gc();
    assert!(!h.contains(ud));
    assert_eq!(live_entries(&h, keys), 0);
}

#[test]
fn test_weak_tables_stay_gray_while_propagating() {
    let mut h = heap();
    let t = weak_table(&mut h, "w", "v");
    let v = h.new_table(0, 0).unwrap();
    h.table_set(t, Value::from(1), Value::Table(v)).unwrap();

    h.single_step();
    while h.phase() == Phase::Propagate {
        h.verify().unwrap();
        h.single_step();
    }
    assert_eq!(h.metrics().cycles_completed, 0);
    while h.phase() != Phase::Pause {
        h.single_step();
        h.verify().unwrap();
    }
    assert!(!h.contains(v));
    assert_eq!(h.table_get(t, &Value::from(1)), Value::Nil);
}
