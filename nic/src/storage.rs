//! Slotted storage backing the packet and reservation rings.
//!
//! Models a synchronous-read memory: a read is issued against an address
//! and its data is collected later. A write to the latched address between
//! issue and collection is forwarded, so the reader always observes the
//! most recent value.

use alloc::vec;
use alloc::vec::Vec;

/// Fixed-capacity array of slots addressed by index.
#[derive(Debug, Clone)]
pub struct SlottedStorage<T> {
    slots: Vec<T>,
    read_addr: Option<usize>,
}

impl<T: Copy + Default> SlottedStorage<T> {
    /// Create storage with `capacity` default-initialised slots.
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Storage capacity must be > 0");
        Self {
            slots: vec![T::default(); capacity],
            read_addr: None,
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Store `value` at `addr`.
    #[inline]
    pub fn write(&mut self, addr: usize, value: T) {
        self.slots[addr] = value;
    }

    /// Read the current value at `addr`.
    #[inline]
    pub fn read(&self, addr: usize) -> T {
        self.slots[addr]
    }

    /// Latch `addr` on the read port.
    pub fn issue_read(&mut self, addr: usize) {
        debug_assert!(addr < self.slots.len(), "BUG: read address out of range");
        self.read_addr = Some(addr);
    }

    /// Collect the latched read, forwarding any write made since issue.
    pub fn read_data(&self) -> Option<T> {
        self.read_addr.map(|addr| self.slots[addr])
    }

    /// Drop the latched read.
    pub fn clear_read(&mut self) {
        self.read_addr = None;
    }
}
