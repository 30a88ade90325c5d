//! An incremental tri-color garbage collector for a dynamic-language heap.
//!
//! `lume-gc` owns every object of a small dynamic runtime (strings, tables,
//! closures, prototypes, upvalues, userdata and threads) inside a [`Heap`]
//! and reclaims unreachable ones with a mark-and-sweep collector that
//! interleaves its work with the program in small, bounded steps.
//!
//! # Features
//!
//! - **Incremental collection**: a cycle is split into units of work sized
//!   by how fast the program allocates, so pauses stay short
//! - **Write barriers**: backward for tables, forward for everything else
//! - **Hybrid tables**: a dense array part for `1..=n` and a chained hash
//!   part with Brent's variation, rehashed to keep the array part over half
//!   full
//! - **String interning**: one object per distinct byte sequence
//! - **Weak tables** via `__mode`, and **finalizers** on userdata that run
//!   exactly once
//!
//! # Quick Start
//!
//! ```
//! use lume_gc::{GcConfig, Heap, Value};
//!
//! let mut heap = Heap::new(GcConfig::default()).unwrap();
//! let t = heap.new_table(0, 0).unwrap();
//! heap.table_set(t, Value::Number(1.0), Value::Boolean(true)).unwrap();
//! heap.table_set_str(heap.globals(), "t", Value::Table(t)).unwrap();
//!
//! // Unanchored objects are reclaimed.
//! let garbage = heap.new_table(0, 0).unwrap();
//! heap.full_gc();
//! assert!(heap.contains(t));
//! assert!(!heap.contains(garbage));
//! ```
//!
//! # Rooting
//!
//! Handles ([`GcRef`], [`StrRef`]) are plain indices and do not keep
//! objects alive. Anchor objects on the main thread's stack
//! ([`Heap::push`]), in the globals table or in the registry before running
//! the collector.
//!
//! # Thread Safety
//!
//! A [`Heap`] is `Send` but every operation takes `&mut self`. Use
//! [`SharedHeap`] to share one between threads.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod alloc;
mod arena;
mod config;
mod error;
mod gc;
mod header;
mod heap;
mod metrics;
mod object;
mod string;
mod sync;
pub mod table;
pub mod tracing;
mod value;

pub use crate::alloc::Accounting;
pub use crate::config::{
    GcConfig, DEFAULT_PAUSE, DEFAULT_STEP_MULTIPLIER, FINALIZE_COST, STEP_SIZE, SWEEP_COST,
    SWEEP_MAX,
};
pub use crate::error::{Error, InvariantViolation, Result};
pub use crate::gc::Phase;
pub use crate::header::{Color, GcFlags, White};
pub use crate::heap::Heap;
pub use crate::metrics::{CollectionType, GcMetrics, PhaseTimes};
pub use crate::object::Finalizer;
pub use crate::string::{hash_bytes, MIN_STRING_TABLE_SIZE};
pub use crate::sync::SharedHeap;
pub use crate::table::{Slot, Table};
pub use crate::value::{GcRef, StrRef, TypeTag, Value};
