//! Tests for sharing a heap between threads through `SharedHeap`.

use std::thread;

use lume_gc::{GcConfig, Heap, SharedHeap, Value};

// Compile-time assertions: a heap can move between threads, and the shared
// handle can be both sent and shared.
const _: fn() = || {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    assert_send::<Heap>();
    assert_send::<SharedHeap>();
    assert_sync::<SharedHeap>();
};

#[test]
fn test_threads_take_turns_on_one_heap() {
    let heap = SharedHeap::new(GcConfig::default()).unwrap();
    let list = heap.with(|h| {
        let t = h.new_table(0, 0)?;
        h.table_set_str(h.globals(), "list", Value::Table(t))?;
        Ok::<_, lume_gc::Error>(t)
    })
    .unwrap();

    let workers: Vec<_> = (0..4_i32)
        .map(|w| {
            let heap = heap.clone();
            thread::spawn(move || {
                for i in 0..250_i32 {
                    heap.with(|h| {
                        let node = h.new_table(0, 0).unwrap();
                        h.table_set_str(node, "worker", Value::from(w)).unwrap();
                        h.table_set(list, Value::from(w * 250 + i + 1), Value::Table(node))
                            .unwrap();
                        // Drive the collector from whichever thread holds the lock.
                        h.check_gc();
                    });
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let mut h = heap.lock();
    h.full_gc();
    h.verify().unwrap();
    assert_eq!(h.table_length(list), 1000);
}

#[test]
fn test_into_inner_requires_last_handle() {
    let heap = SharedHeap::new(GcConfig::default()).unwrap();
    let other = heap.clone();
    let heap = heap.into_inner().unwrap_err();
    drop(other);
    let mut h = heap.into_inner().unwrap();
    h.full_gc();
    assert_eq!(h.metrics().full_collections, 1);
}

#[test]
fn test_try_lock_fails_while_held() {
    let heap = SharedHeap::from_heap(Heap::new(GcConfig::default()).unwrap());
    let guard = heap.lock();
    assert!(heap.is_locked());
    assert!(heap.try_lock().is_none());
    drop(guard);
    assert!(!heap.is_locked());
    assert!(heap.try_lock().is_some());
}

#[test]
fn test_finalizer_may_be_registered_from_another_thread() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    let heap = SharedHeap::new(GcConfig::default()).unwrap();
    let ran = Arc::new(AtomicBool::new(false));
    let ran_in = Arc::clone(&ran);
    let shared = heap.clone();
    thread::spawn(move || {
        shared.with(|h| {
            let ud = h.new_userdata(vec![1u8], None).unwrap();
            h.set_finalizer(
                ud,
                Box::new(move |_: &mut Heap, _: lume_gc::GcRef| {
                    ran_in.store(true, Ordering::SeqCst);
                }),
            );
        });
    })
    .join()
    .unwrap();

    heap.with(Heap::full_gc);
    assert!(ran.load(Ordering::SeqCst));
}
