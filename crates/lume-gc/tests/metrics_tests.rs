//! Integration tests for collector counters and per-phase timing.

use lume_gc::{CollectionType, GcConfig, Heap, Phase, Value};

fn heap() -> Heap {
    Heap::new(GcConfig::default()).unwrap()
}

#[test]
fn test_no_cycle_yet() {
    let h = heap();
    let m = h.metrics();
    assert_eq!(m.cycles_completed, 0);
    assert_eq!(m.last_collection_type, CollectionType::None);
    assert_eq!(m.units, 0);
}

#[test]
fn test_full_gc_counts_freed_objects() {
    let mut h = heap();
    for i in 0..100_i32 {
        let t = h.new_table(0, 0).unwrap();
        let s = h.intern(format!("garbage {i}").as_bytes()).unwrap();
        h.table_set(t, Value::from(1), Value::String(s)).unwrap();
    }
    let before = h.total_bytes();
    h.full_gc();

    let m = *h.metrics();
    assert_eq!(m.cycles_completed, 1);
    assert_eq!(m.full_collections, 1);
    assert_eq!(m.last_collection_type, CollectionType::Full);
    assert_eq!(m.objects_freed, 100);
    assert_eq!(m.strings_freed, 100);
    assert!(m.bytes_freed > 0);
    assert!(h.total_bytes() < before);
    // full_gc does not go through the budgeted entry point.
    assert_eq!(m.steps, 0);
    assert!(m.units > 0);
}

#[test]
fn test_stepped_cycle_is_incremental() {
    let mut h = heap();
    h.single_step();
    while h.phase() != Phase::Pause {
        h.single_step();
    }
    let m = h.metrics();
    assert_eq!(m.cycles_completed, 1);
    assert_eq!(m.full_collections, 0);
    assert_eq!(m.last_collection_type, CollectionType::Incremental);
}

#[test]
fn test_units_count_every_single_step() {
    let mut h = heap();
    for n in 1..=10 {
        h.single_step();
        assert_eq!(h.metrics().units, n);
    }
}

#[test]
fn test_last_cycle_times_are_replaced_per_cycle() {
    let mut h = heap();
    for _ in 0..1000 {
        h.new_table(0, 0).unwrap();
    }
    h.full_gc();
    let first = h.metrics().last_cycle;
    assert!(first.total() >= first.atomic);
    assert!(first.total() >= first.sweep);

    h.full_gc();
    let second = h.metrics().last_cycle;
    assert_eq!(h.metrics().cycles_completed, 2);
    assert_eq!(
        second.total(),
        second.propagate + second.atomic + second.sweep_strings + second.sweep + second.finalize
    );
}

#[test]
fn test_finalizers_are_counted() {
    let mut h = heap();
    for _ in 0..3 {
        let ud = h.new_userdata(vec![], None).unwrap();
        h.set_finalizer(ud, Box::new(|_: &mut Heap, _: lume_gc::GcRef| {}));
    }
    h.full_gc();
    assert_eq!(h.metrics().finalizers_run, 3);
    // Userdata with a finalizer survive one extra cycle.
    assert_eq!(h.metrics().objects_freed, 0);
    h.full_gc();
    assert_eq!(h.metrics().objects_freed, 3);
}

#[test]
fn test_barrier_counters_start_at_zero_outside_marking() {
    let mut h = heap();
    let t = h.new_table(0, 0).unwrap();
    h.table_set_str(h.globals(), "t", Value::Table(t)).unwrap();
    let uv = h.new_upvalue(Value::Nil).unwrap();
    h.upvalue_set(uv, Value::Table(t));
    // Nothing is black while the collector is paused.
    assert_eq!(h.metrics().barriers_backward, 0);
    assert_eq!(h.metrics().barriers_forward, 0);
}
