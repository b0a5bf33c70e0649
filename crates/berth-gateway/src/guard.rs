//! Stream size guard - a pass-through byte ceiling.
//!
//! The guard is applied to the live stream, not to a declared
//! content-length, so a missing or falsified length header cannot evade
//! the ceiling.

use crate::{GatewayError, Result};

/// Running byte counter with a hard ceiling.
#[derive(Debug)]
pub struct SizeGuard {
    limit: u64,
    seen: u64,
}

impl SizeGuard {
    /// Creates a guard with the given byte ceiling.
    pub fn new(limit: u64) -> Self {
        Self { limit, seen: 0 }
    }

    /// Accounts for a chunk of the stream.
    ///
    /// Returns `PayloadTooLarge` the moment the running total exceeds
    /// the ceiling; the chunk that crossed the line is not forwarded.
    pub fn absorb(&mut self, len: usize) -> Result<()> {
        self.seen = self.seen.saturating_add(len as u64);
        if self.seen > self.limit {
            Err(GatewayError::PayloadTooLarge)
        } else {
            Ok(())
        }
    }

    /// Total bytes observed so far.
    pub fn seen(&self) -> u64 {
        self.seen
    }
}
