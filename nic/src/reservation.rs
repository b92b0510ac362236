//! Reorder buffer for out-of-order DMA read completions.
//!
//! Every outstanding transfer reserves a contiguous run of ring slots, in
//! the order its request was issued, before any of its data exists. Data
//! for a transfer lands at that transfer's own cursor, and the consumer only
//! advances `tail` past slots that are present. Output therefore follows
//! allocation order no matter how completions for different ids interleave.
//!
//! # Allocation
//! ```text
//!   allocate(0, 3)   allocate(1, 2)
//!   ┌───┬───┬───┬───┬───┬───┬───┬───┐
//!   │ 0 │ 0 │ 0 │ 1 │ 1 │   │   │   │
//!   └───┴───┴───┴───┴───┴───┴───┴───┘
//!     ▲ tail                ▲ head
//! ```

use alloc::vec;
use alloc::vec::Vec;
use log::trace;

use crate::error::{NicError, Result};
use crate::storage::SlottedStorage;

/// Write cursor of one transfer id.
#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    next_write: usize,
    /// Reserved slots not yet written.
    remaining: usize,
}

/// Ring of reserved slots re-linearising per-id data.
#[derive(Debug)]
pub struct ReservationBuffer<T> {
    slots: SlottedStorage<T>,
    /// Presence bit per slot: written and not yet consumed.
    present: Vec<u64>,
    cursors: Vec<Cursor>,
    head: usize,
    tail: usize,
    /// Slots reserved and not yet consumed.
    count: usize,
}

impl<T: Copy + Default> ReservationBuffer<T> {
    /// Create a buffer of `n_words` slots shared by `n_transfers` ids.
    ///
    /// # Panics
    ///
    /// Panics if either size is 0.
    pub fn new(n_transfers: usize, n_words: usize) -> Self {
        assert!(n_transfers > 0, "Need at least one transfer id");
        Self {
            slots: SlottedStorage::new(n_words),
            present: vec![0; (n_words + 63) / 64],
            cursors: vec![Cursor::default(); n_transfers],
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    /// Ring size in slots.
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Reserved slots not yet consumed.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Slots available for new reservations.
    pub fn free(&self) -> usize {
        self.capacity() - self.count
    }

    /// Number of transfer ids.
    pub fn n_transfers(&self) -> usize {
        self.cursors.len()
    }

    /// Reserved slots transfer `id` has yet to write.
    pub fn outstanding(&self, id: usize) -> usize {
        self.cursors.get(id).map_or(0, |c| c.remaining)
    }

    #[inline]
    fn wrap_add(&self, idx: usize, n: usize) -> usize {
        (idx + n) % self.capacity()
    }

    #[inline]
    fn is_present(&self, slot: usize) -> bool {
        self.present[slot / 64] & (1 << (slot % 64)) != 0
    }

    #[inline]
    fn set_present(&mut self, slot: usize, present: bool) {
        let bit = 1u64 << (slot % 64);
        if present {
            self.present[slot / 64] |= bit;
        } else {
            self.present[slot / 64] &= !bit;
        }
    }

    /// Reserve `count` slots for transfer `id` starting at the current head.
    ///
    /// # Returns
    /// - `Ok(())`: slots reserved, head advanced
    /// - `Err(NicError::BufferFull)`: not enough free slots; nothing changed
    /// - `Err(NicError::InvalidTransferId)`: `id` out of range
    /// - `Err(NicError::Busy)`: `id` still has reserved slots to write; nothing changed
    pub fn allocate(&mut self, id: usize, count: usize) -> Result<()> {
        if id >= self.cursors.len() {
            return Err(NicError::InvalidTransferId);
        }
        if self.cursors[id].remaining != 0 {
            return Err(NicError::Busy);
        }
        if self.count + count > self.capacity() {
            return Err(NicError::BufferFull);
        }

        self.cursors[id] = Cursor { next_write: self.head, remaining: count };
        self.head = self.wrap_add(self.head, count);
        self.count += count;
        trace!("reservation: id {} reserved {} slots, {} in use", id, count, self.count);
        Ok(())
    }

    /// Store the next value of transfer `id` in its reserved slot.
    pub fn write(&mut self, id: usize, data: T) -> Result<()> {
        let cursor = self.cursors.get(id).copied().ok_or(NicError::InvalidTransferId)?;
        if cursor.remaining == 0 {
            return Err(NicError::NoReservation);
        }

        let slot = cursor.next_write;
        debug_assert!(!self.is_present(slot), "BUG: reserved slot {} already present", slot);
        self.slots.write(slot, data);
        self.set_present(slot, true);
        self.cursors[id] = Cursor {
            next_write: self.wrap_add(slot, 1),
            remaining: cursor.remaining - 1,
        };
        Ok(())
    }

    /// True when the slot at `tail` has been written.
    pub fn can_consume(&self) -> bool {
        self.count > 0 && self.is_present(self.tail)
    }

    /// Value at `tail`, if present, without consuming it.
    pub fn peek(&self) -> Option<T> {
        self.can_consume().then(|| self.slots.read(self.tail))
    }

    /// Take the value at `tail` once it is present.
    pub fn consume(&mut self) -> Option<T> {
        if !self.can_consume() {
            return None;
        }
        self.slots.issue_read(self.tail);
        let data = self.slots.read_data();
        self.slots.clear_read();
        self.set_present(self.tail, false);
        self.tail = self.wrap_add(self.tail, 1);
        self.count -= 1;
        data
    }
}
