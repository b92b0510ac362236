//! Diagnostic event ring for dropped packets.
//!
//! Fixed-size circular log owned by the packet buffer. Every drop is
//! recorded here and counted; when the ring is full the oldest entry is
//! overwritten and the reader skips ahead.

use crate::error::NicError;

/// Number of entries retained in the ring (power of 2 for efficient modulo).
pub const EVENT_RING_SIZE: usize = 32;

/// Why a packet was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DropReason {
    /// Word count reached the configured maximum.
    TooLong = 0,
    /// Packet ended before the header was complete.
    TooShort = 1,
    /// Descriptor slot for the packet was still occupied.
    DescriptorBusy = 2,
    /// Packet ring had no free word.
    RingFull = 3,
    /// A word with no valid lanes was pushed.
    Malformed = 4,
}

impl DropReason {
    /// Short name for log lines.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TooLong => "TOO_LONG",
            Self::TooShort => "TOO_SHORT",
            Self::DescriptorBusy => "DESC_BUSY",
            Self::RingFull => "RING_FULL",
            Self::Malformed => "MALFORMED",
        }
    }

    /// Error kind corresponding to this reason.
    pub const fn error(&self) -> NicError {
        match self {
            Self::TooLong => NicError::PacketTooLong,
            Self::TooShort => NicError::PacketTooShort,
            Self::DescriptorBusy => NicError::DescriptorBusy,
            Self::RingFull => NicError::BufferFull,
            Self::Malformed => NicError::MalformedInput,
        }
    }
}

/// Single entry in the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropEvent {
    /// First reason observed for the packet.
    pub reason: DropReason,
    /// Words the packet carried, including discarded ones.
    pub words: usize,
    /// Descriptor phase ingress was filling.
    pub phase: usize,
}

/// Per-reason drop counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropCounters {
    pub too_long: u64,
    pub too_short: u64,
    pub descriptor_busy: u64,
    pub ring_full: u64,
    pub malformed: u64,
}

impl DropCounters {
    pub fn bump(&mut self, reason: DropReason) {
        let slot = match reason {
            DropReason::TooLong => &mut self.too_long,
            DropReason::TooShort => &mut self.too_short,
            DropReason::DescriptorBusy => &mut self.descriptor_busy,
            DropReason::RingFull => &mut self.ring_full,
            DropReason::Malformed => &mut self.malformed,
        };
        *slot += 1;
    }

    /// Total packets dropped for any reason.
    pub fn total(&self) -> u64 {
        self.too_long + self.too_short + self.descriptor_busy + self.ring_full + self.malformed
    }
}

/// Circular drop log.
#[derive(Debug, Clone)]
pub struct EventLog {
    ring: [Option<DropEvent>; EVENT_RING_SIZE],
    /// Read position (monotonic, wraps via modulo on access).
    read_pos: usize,
    /// Total entries written (for overflow detection).
    total_written: usize,
}

impl EventLog {
    pub const fn new() -> Self {
        Self {
            ring: [None; EVENT_RING_SIZE],
            read_pos: 0,
            total_written: 0,
        }
    }

    /// Record an event, overwriting the oldest when full.
    pub fn record(&mut self, event: DropEvent) {
        self.ring[self.total_written % EVENT_RING_SIZE] = Some(event);
        self.total_written += 1;
    }

    /// Pop the oldest retained event.
    ///
    /// Returns `None` if the log is empty.
    pub fn pop(&mut self) -> Option<DropEvent> {
        if self.read_pos >= self.total_written {
            return None;
        }

        // Skip entries that were overwritten.
        let available = self.total_written - self.read_pos;
        if available > EVENT_RING_SIZE {
            self.read_pos += available - EVENT_RING_SIZE;
        }

        let event = self.ring[self.read_pos % EVENT_RING_SIZE];
        self.read_pos += 1;
        event
    }

    /// Events available to read.
    pub fn available(&self) -> usize {
        (self.total_written - self.read_pos).min(EVENT_RING_SIZE)
    }

    /// Total events ever recorded.
    pub fn count(&self) -> usize {
        self.total_written
    }

    /// Discard unread events.
    pub fn clear(&mut self) {
        self.read_pos = self.total_written;
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
