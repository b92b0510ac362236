//! Transfer id tracking.
//!
//! Each DMA engine owns a small set of transfer ids. An id is busy from the
//! moment its sub-request is issued until its last completion returns; the
//! engine stalls when every id is busy.

use crate::config::MAX_TRANSFER_IDS;

/// Transfer id naming one outstanding memory operation.
pub type TransferId = usize;

/// Busy bitmap over `count` ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdPool {
    busy: u32,
    count: usize,
}

impl IdPool {
    /// Create a pool of `count` ids, all free.
    ///
    /// # Panics
    /// Panics if `count` is 0 or exceeds `MAX_TRANSFER_IDS`.
    pub fn new(count: usize) -> Self {
        assert!(count > 0 && count <= MAX_TRANSFER_IDS, "Transfer id count out of range");
        Self { busy: 0, count }
    }

    fn all_mask(&self) -> u32 {
        if self.count == 32 {
            u32::MAX
        } else {
            (1u32 << self.count) - 1
        }
    }

    /// Lowest free id, without claiming it.
    pub fn peek_free(&self) -> Option<TransferId> {
        let free = !self.busy & self.all_mask();
        (free != 0).then(|| free.trailing_zeros() as TransferId)
    }

    /// Claim the lowest free id.
    pub fn alloc(&mut self) -> Option<TransferId> {
        let id = self.peek_free()?;
        self.mark_busy(id);
        Some(id)
    }

    /// Mark `id` busy.
    pub fn mark_busy(&mut self, id: TransferId) {
        debug_assert!(id < self.count, "BUG: transfer id {} out of range", id);
        debug_assert!(!self.is_busy(id), "BUG: transfer id {} already busy", id);
        self.busy |= 1 << id;
    }

    /// Return `id` to the pool.
    pub fn release(&mut self, id: TransferId) {
        debug_assert!(self.is_busy(id), "BUG: releasing idle transfer id {}", id);
        self.busy &= !(1 << id);
    }

    pub fn is_busy(&self, id: TransferId) -> bool {
        id < self.count && self.busy & (1 << id) != 0
    }

    /// Number of ids in flight.
    pub fn in_flight(&self) -> usize {
        self.busy.count_ones() as usize
    }

    /// True when no id is in flight.
    pub fn is_idle(&self) -> bool {
        self.busy == 0
    }

    /// True when every id is in flight.
    pub fn is_exhausted(&self) -> bool {
        self.busy == self.all_mask()
    }
}
