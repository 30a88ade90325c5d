//! Sharing one heap between threads.
//!
//! The collector is not concurrent: every operation needs exclusive access
//! to the [`Heap`]. [`SharedHeap`] wraps it in a `parking_lot` mutex so that
//! several threads can take turns driving the same heap.
//!
//! # Examples
//!
//! ```
//! use lume_gc::{GcConfig, SharedHeap, Value};
//!
//! let heap = SharedHeap::new(GcConfig::default()).unwrap();
//!
//! let worker = std::thread::spawn({
//!     let heap = heap.clone();
//!     move || {
//!         heap.with(|h| {
//!             let t = h.new_table(0, 0)?;
//!             h.table_set_str(h.globals(), "from_worker", Value::Table(t))
//!         })
//!     }
//! });
//! worker.join().unwrap().unwrap();
//!
//! let mut h = heap.lock();
//! h.full_gc();
//! assert!(h.table_get_str(h.globals(), "from_worker").as_table().is_some());
//! ```

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::config::GcConfig;
use crate::error::Result;
use crate::heap::Heap;

/// A [`Heap`] behind a mutex, cheap to clone.
#[derive(Clone)]
pub struct SharedHeap {
    inner: Arc<Mutex<Heap>>,
}

impl SharedHeap {
    /// Create a new shared heap.
    ///
    /// # Errors
    ///
    /// As for [`Heap::new`].
    pub fn new(config: GcConfig) -> Result<Self> {
        Ok(Self::from_heap(Heap::new(config)?))
    }

    /// Share an existing heap.
    #[must_use]
    pub fn from_heap(heap: Heap) -> Self {
        Self {
            inner: Arc::new(Mutex::new(heap)),
        }
    }

    /// Acquire exclusive access. The lock is released when the guard is
    /// dropped.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, Heap> {
        self.inner.lock()
    }

    /// Attempt to acquire exclusive access without blocking.
    #[inline]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, Heap>> {
        self.inner.try_lock()
    }

    /// Run `f` with the heap locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut Heap) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Whether some thread currently holds the lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// Take the heap back if this is the last handle.
    ///
    /// # Errors
    ///
    /// Returns `self` unchanged while other clones exist.
    pub fn into_inner(self) -> std::result::Result<Heap, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}

impl std::fmt::Debug for SharedHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedHeap")
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}
