//! Byte accounting for the collector.
//!
//! Nothing here allocates: Rust owns the memory. The accountant only keeps
//! the counters the collector paces itself by and enforces the optional
//! memory limit before a request is carried out.

use crate::error::{Error, Result};

/// Heap byte counters.
#[derive(Debug, Clone)]
pub struct Accounting {
    /// Bytes currently charged to live (or not yet swept) objects.
    pub total: usize,
    /// Estimate of truly live bytes, set at the end of marking.
    pub estimate: usize,
    /// `total` at which the next collector step is due.
    pub threshold: usize,
    /// Work owed to the collector, in bytes.
    pub debt: usize,
    limit: Option<usize>,
}

impl Accounting {
    #[must_use]
    pub const fn new(limit: Option<usize>) -> Self {
        Self {
            total: 0,
            estimate: 0,
            threshold: 0,
            debt: 0,
            limit,
        }
    }

    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    /// Check that `bytes` more would fit, without charging them.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`] if the limit would be exceeded.
    pub fn reserve(&self, bytes: usize) -> Result<()> {
        match self.limit {
            Some(limit) if self.total.saturating_add(bytes) > limit => Err(Error::OutOfMemory {
                requested: bytes,
                limit,
            }),
            _ => Ok(()),
        }
    }

    /// Charge `bytes` for a new allocation.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`] if the limit would be exceeded; nothing is
    /// charged in that case.
    pub fn charge(&mut self, bytes: usize) -> Result<()> {
        self.reserve(bytes)?;
        self.total += bytes;
        Ok(())
    }

    /// Return `bytes` from a freed or shrunk allocation.
    pub fn release(&mut self, bytes: usize) {
        debug_assert!(bytes <= self.total, "releasing more than was charged");
        self.total = self.total.saturating_sub(bytes);
    }

    /// Move an allocation from `old` to `new` bytes.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`] if growing would exceed the limit.
    pub fn realloc(&mut self, old: usize, new: usize) -> Result<()> {
        if new > old {
            self.charge(new - old)
        } else {
            self.release(old - new);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charge_and_release() {
        let mut acct = Accounting::new(None);
        acct.charge(100).unwrap();
        acct.realloc(100, 40).unwrap();
        assert_eq!(acct.total, 40);
        acct.release(40);
        assert_eq!(acct.total, 0);
    }

    #[test]
    fn limit_rejects_without_charging() {
        let mut acct = Accounting::new(Some(64));
        acct.charge(60).unwrap();
        assert_eq!(
            acct.charge(10),
            Err(Error::OutOfMemory {
                requested: 10,
                limit: 64
            })
        );
        assert_eq!(acct.total, 60);
        assert!(acct.realloc(60, 64).is_ok());
        assert!(acct.realloc(64, 65).is_err());
    }
}
