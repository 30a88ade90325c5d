//! Error kinds surfaced to the runtime layer.
//!
//! Only conditions a well-behaved caller can trigger are reported here.
//! Broken invariants (stale handles, wrong object kinds, illegal color
//! transitions) are programming errors in a collaborator and panic instead.

use thiserror::Error;

use crate::value::GcRef;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Recoverable failures of heap, table and string operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// An allocation would push the heap past its configured memory limit.
    #[error("not enough memory: {requested} more bytes requested, limit is {limit}")]
    OutOfMemory {
        /// Bytes the failed request asked for.
        requested: usize,
        /// The configured limit.
        limit: usize,
    },

    /// A key handed to `next` is not present in the table.
    #[error("invalid key to 'next'")]
    InvalidNextKey,

    /// `nil` cannot be used as a table index.
    #[error("table index is nil")]
    NilIndex,

    /// `NaN` cannot be used as a table index.
    #[error("table index is NaN")]
    NanIndex,

    /// The hash part would need more buckets than can be represented.
    #[error("table overflow")]
    TableOverflow,
}

/// A consistency failure found by [`Heap::verify`](crate::Heap::verify).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// A black object references a white one between collector steps.
    #[error("black object {container:?} references white object {child:?}")]
    BlackToWhite {
        /// The black referrer.
        container: GcRef,
        /// The white referent.
        child: GcRef,
    },

    /// A live object references a slot that has already been freed.
    #[error("object {container:?} references freed object {child:?}")]
    Dangling {
        /// The referrer.
        container: GcRef,
        /// The stale handle.
        child: GcRef,
    },

    /// A live object references one already condemned by this cycle's
    /// sweep.
    #[error("object {container:?} references dead object {child:?}")]
    DeadReference {
        /// The referrer.
        container: GcRef,
        /// The object the sweep will free.
        child: GcRef,
    },

    /// An object sits on a gray list without being gray.
    #[error("object {object:?} is queued for traversal but is not gray")]
    QueuedNotGray {
        /// The misplaced object.
        object: GcRef,
    },
}
