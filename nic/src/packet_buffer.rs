//! Multi-packet receive buffer.
//!
//! Words arrive from the link one at a time and are written into a shared
//! ring. Each packet owns a descriptor slot (captured header + length);
//! descriptors are filled round-robin by ingress and drained round-robin by
//! egress, so packets leave in the order they were committed.
//!
//! # Drop policy
//!
//! Ingress never stalls. A packet is dropped as a whole when, on any of its
//! words, the descriptor it would fill is still occupied, the ring is full,
//! or it reaches the maximum word count; it is also dropped at its end if it
//! is shorter than the header. Words a dropped packet already wrote are
//! reclaimed by rolling `head` back to where the packet started.
//!
//! ```text
//!        tail                start_head      head
//!         │                      │             │
//!   ┌─────▼──────────────────────▼─────────────▼──────┐
//!   │ ... │ pkt 0 (valid) │ pkt 1 │ in-progress │ ... │
//!   └─────────────────────────────────────────────────┘
//! ```

use alloc::vec;
use alloc::vec::Vec;
use log::{error, trace, warn};

use crate::config::NicConfig;
use crate::error::{NicError, Result};
use crate::events::{DropCounters, DropEvent, DropReason, EventLog};
use crate::header::PacketHeader;
use crate::storage::SlottedStorage;
use crate::word::{full_keep, ByteMask, StreamWord, Word};

/// Result of pushing one word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Word stored; packet still in progress.
    Buffered,
    /// Word discarded because the current packet is being dropped.
    Discarded,
    /// Final word stored and the packet committed.
    Committed { length: usize },
    /// Packet ended and was dropped.
    Dropped { reason: DropReason, words: usize },
}

/// Packet buffer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketBufferStats {
    /// Packets committed by ingress.
    pub committed: u64,
    /// Packets fully drained by egress.
    pub delivered: u64,
    /// Dropped packets by reason.
    pub drops: DropCounters,
}

#[derive(Debug, Clone)]
struct Descriptor {
    header: Vec<Word>,
    /// Word count; zero while the slot is free.
    length: usize,
}

impl Descriptor {
    fn is_valid(&self) -> bool {
        self.length > 0
    }
}

/// Circular buffer of whole packets.
#[derive(Debug)]
pub struct PacketBuffer {
    ring: SlottedStorage<StreamWord>,
    descriptors: Vec<Descriptor>,
    head: usize,
    tail: usize,
    maybe_full: bool,

    in_phase: usize,
    in_index: usize,
    /// First reason the current packet started dropping.
    in_dropping: Option<DropReason>,
    /// Words seen for the current packet, stored or not.
    in_words: usize,
    start_head: usize,

    out_phase: usize,
    out_index: usize,

    max_words: usize,
    header_words: usize,
    word_bytes: usize,
    keep_mask: ByteMask,

    stats: PacketBufferStats,
    events: EventLog,
}

impl PacketBuffer {
    /// Build a packet buffer for the given geometry.
    pub fn new(config: &NicConfig) -> Result<Self> {
        config.validate()?;
        let header_words = config.header_words();
        Ok(Self {
            ring: SlottedStorage::new(config.ring_words()),
            descriptors: vec![
                Descriptor { header: vec![0; header_words], length: 0 };
                config.n_packets
            ],
            head: 0,
            tail: 0,
            maybe_full: false,
            in_phase: 0,
            in_index: 0,
            in_dropping: None,
            in_words: 0,
            start_head: 0,
            out_phase: 0,
            out_index: 0,
            max_words: config.max_words(),
            header_words,
            word_bytes: config.word_bytes(),
            keep_mask: full_keep(config.word_bytes()),
            stats: PacketBufferStats::default(),
            events: EventLog::new(),
        })
    }

    /// Ring capacity in words.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Number of descriptor slots.
    pub fn n_packets(&self) -> usize {
        self.descriptors.len()
    }

    /// Words currently held in the ring, including a packet in progress.
    pub fn occupancy(&self) -> usize {
        if self.is_ring_full() {
            self.capacity()
        } else {
            (self.head + self.capacity() - self.tail) % self.capacity()
        }
    }

    /// Current ring write position.
    pub fn head(&self) -> usize {
        self.head
    }

    fn is_ring_full(&self) -> bool {
        self.maybe_full && self.head == self.tail
    }

    fn is_ring_empty(&self) -> bool {
        !self.maybe_full && self.head == self.tail
    }

    #[inline]
    fn wrap_inc(&self, idx: usize) -> usize {
        if idx + 1 == self.capacity() {
            0
        } else {
            idx + 1
        }
    }

    /// Reason the next word of the current packet cannot be stored.
    ///
    /// `RingFull` cannot fire while the ring holds `n_packets` maximum-size
    /// packets; it guards geometries where the ring is smaller.
    fn drop_check(&self) -> Option<DropReason> {
        if self.in_phase == self.out_phase && self.descriptors[self.in_phase].is_valid() {
            Some(DropReason::DescriptorBusy)
        } else if self.in_index == self.max_words {
            Some(DropReason::TooLong)
        } else if self.is_ring_full() {
            Some(DropReason::RingFull)
        } else {
            None
        }
    }

    fn start_dropping(&mut self, reason: DropReason) {
        if self.in_dropping.is_none() {
            trace!("packet buffer: phase {} dropping ({})", self.in_phase, reason.name());
            self.in_dropping = Some(reason);
        }
    }

    /// Push one word from the link.
    ///
    /// Always accepted. A word with no valid lanes is a producer bug: it is
    /// reported as `MalformedInput` and its packet is dropped.
    pub fn push(&mut self, word: StreamWord) -> Result<PushOutcome> {
        let mut word = word;
        word.keep &= self.keep_mask;

        if self.in_words == 0 {
            self.start_head = self.head;
        }
        self.in_words += 1;

        let malformed = !word.has_data();
        if malformed {
            error!(
                "packet buffer: word {} of phase {} has no valid bytes",
                self.in_words - 1,
                self.in_phase
            );
            self.start_dropping(DropReason::Malformed);
        }

        if let Some(reason) = self.drop_check() {
            self.start_dropping(reason);
        }
        if word.last && self.in_dropping.is_none() && self.in_index + 1 < self.header_words {
            self.start_dropping(DropReason::TooShort);
        }

        let stored = self.in_dropping.is_none();
        if stored {
            if self.in_index < self.header_words {
                self.descriptors[self.in_phase].header[self.in_index] = word.data;
            }
            self.ring.write(self.head, word);
            self.head = self.wrap_inc(self.head);
            self.maybe_full = true;
            self.in_index += 1;
        }

        let outcome = if !word.last {
            if stored { PushOutcome::Buffered } else { PushOutcome::Discarded }
        } else {
            self.finish_packet()
        };

        if malformed {
            Err(NicError::MalformedInput)
        } else {
            Ok(outcome)
        }
    }

    /// Commit or drop the packet whose final word was just pushed.
    fn finish_packet(&mut self) -> PushOutcome {
        let outcome = match self.in_dropping {
            None => {
                let length = self.in_index;
                self.descriptors[self.in_phase].length = length;
                trace!("packet buffer: committed {} words in phase {}", length, self.in_phase);
                self.in_phase = (self.in_phase + 1) % self.descriptors.len();
                self.stats.committed += 1;
                PushOutcome::Committed { length }
            }
            Some(reason) => {
                if self.in_index != 0 {
                    self.head = self.start_head;
                    self.maybe_full = false;
                }
                let words = self.in_words;
                warn!(
                    "packet buffer: dropped packet with {} words ({}: {})",
                    words,
                    reason.name(),
                    reason.error()
                );
                self.stats.drops.bump(reason);
                self.events.record(DropEvent { reason, words, phase: self.in_phase });
                PushOutcome::Dropped { reason, words }
            }
        };

        self.in_index = 0;
        self.in_words = 0;
        self.in_dropping = None;
        outcome
    }

    /// True when the oldest packet has a word ready.
    pub fn can_pop(&self) -> bool {
        self.descriptors[self.out_phase].is_valid() && !self.is_ring_empty()
    }

    /// Pop the next word of the oldest committed packet.
    ///
    /// The word carrying the packet's final index has `last` set; popping it
    /// frees the descriptor.
    pub fn pop(&mut self) -> Option<StreamWord> {
        if !self.can_pop() {
            return None;
        }

        self.ring.issue_read(self.tail);
        let mut word = self.ring.read_data()?;
        self.ring.clear_read();
        self.tail = self.wrap_inc(self.tail);
        self.maybe_full = false;

        let desc = &mut self.descriptors[self.out_phase];
        word.last = self.out_index + 1 == desc.length;
        if word.last {
            desc.length = 0;
            self.out_index = 0;
            self.out_phase = (self.out_phase + 1) % self.descriptors.len();
            self.stats.delivered += 1;
        } else {
            self.out_index += 1;
        }
        Some(word)
    }

    /// Header of the oldest pending packet.
    pub fn peek_header(&self) -> Option<PacketHeader<'_>> {
        let desc = &self.descriptors[self.out_phase];
        desc.is_valid().then(|| PacketHeader::new(&desc.header, self.word_bytes))
    }

    /// Word count of the oldest pending packet, 0 when none is pending.
    pub fn peek_length(&self) -> usize {
        self.descriptors[self.out_phase].length
    }

    /// Byte count of the oldest pending packet as if every word were full.
    pub fn peek_length_bytes(&self) -> usize {
        self.peek_length() * self.word_bytes
    }

    /// Committed packets not yet fully drained.
    pub fn pending_packet_count(&self) -> usize {
        self.descriptors.iter().filter(|d| d.is_valid()).count()
    }

    /// True while a packet is partially received.
    pub fn ingress_in_progress(&self) -> bool {
        self.in_words != 0
    }

    pub fn stats(&self) -> PacketBufferStats {
        self.stats
    }

    /// Drop event log.
    pub fn events(&mut self) -> &mut EventLog {
        &mut self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    /// Words `base, base+1, ...` for a packet of `len` 4-byte words.
    fn packet(base: u64, len: usize) -> Vec<StreamWord> {
        (0..len)
            .map(|i| StreamWord::new(base + i as u64, 0x0F, i + 1 == len))
            .collect()
    }

    fn push_packet(buf: &mut PacketBuffer, words: &[StreamWord]) -> PushOutcome {
        let mut outcome = PushOutcome::Buffered;
        for &w in words {
            outcome = buf.push(w).unwrap();
        }
        outcome
    }

    fn drain_packet(buf: &mut PacketBuffer) -> Vec<StreamWord> {
        let mut out = Vec::new();
        while let Some(w) = buf.pop() {
            out.push(w);
            if w.last {
                break;
            }
        }
        out
    }

    #[test]
    fn test_scenario_drop_pattern() {
        let mut buf = PacketBuffer::new(&NicConfig::compact()).unwrap();

        let long = push_packet(&mut buf, &packet(100, 10));
        assert_eq!(long, PushOutcome::Dropped { reason: DropReason::TooLong, words: 10 });
        assert_eq!(push_packet(&mut buf, &packet(200, 4)), PushOutcome::Committed { length: 4 });
        let short = push_packet(&mut buf, &packet(300, 1));
        assert_eq!(short, PushOutcome::Dropped { reason: DropReason::TooShort, words: 1 });
        assert_eq!(push_packet(&mut buf, &packet(400, 5)), PushOutcome::Committed { length: 5 });

        assert_eq!(buf.pending_packet_count(), 2);
        assert_eq!(drain_packet(&mut buf), packet(200, 4));
        assert_eq!(drain_packet(&mut buf), packet(400, 5));
        assert_eq!(buf.pop(), None);

        let stats = buf.stats();
        assert_eq!(stats.committed, 2);
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.drops.too_long, 1);
        assert_eq!(stats.drops.too_short, 1);
        assert_eq!(buf.events().available(), 2);
    }

    #[test]
    fn test_rollback_restores_head() {
        let mut buf = PacketBuffer::new(&NicConfig::compact()).unwrap();
        push_packet(&mut buf, &packet(0, 3));
        let before = buf.head();
        push_packet(&mut buf, &packet(10, 9));
        assert_eq!(buf.head(), before);
        assert_eq!(buf.occupancy(), 3);
    }

    #[test]
    fn test_exact_max_length_kept() {
        let mut buf = PacketBuffer::new(&NicConfig::compact()).unwrap();
        assert_eq!(push_packet(&mut buf, &packet(0, 8)), PushOutcome::Committed { length: 8 });
        assert_eq!(
            push_packet(&mut buf, &packet(0, 9)),
            PushOutcome::Dropped { reason: DropReason::TooLong, words: 9 }
        );
        assert_eq!(buf.peek_length(), 8);
    }

    #[test]
    fn test_header_sized_packet_kept() {
        let mut buf = PacketBuffer::new(&NicConfig::compact()).unwrap();
        assert_eq!(push_packet(&mut buf, &packet(0, 2)), PushOutcome::Committed { length: 2 });
    }

    #[test]
    fn test_descriptor_busy_drops_whole_packet() {
        let mut buf = PacketBuffer::new(&NicConfig::compact()).unwrap();
        push_packet(&mut buf, &packet(0, 4));
        push_packet(&mut buf, &packet(10, 4));

        // Both descriptors occupied: the next packet is dropped even if the
        // consumer frees a slot part-way through it.
        assert_eq!(buf.push(packet(20, 4)[0]).unwrap(), PushOutcome::Discarded);
        drain_packet(&mut buf);
        let rest = &packet(20, 4)[1..];
        assert_eq!(
            push_packet(&mut buf, rest),
            PushOutcome::Dropped { reason: DropReason::DescriptorBusy, words: 4 }
        );

        assert_eq!(drain_packet(&mut buf), packet(10, 4));
        assert_eq!(push_packet(&mut buf, &packet(30, 3)), PushOutcome::Committed { length: 3 });
        assert_eq!(drain_packet(&mut buf), packet(30, 3));
    }

    #[test]
    fn test_peek_header_and_length() {
        let mut buf = PacketBuffer::new(&NicConfig::compact()).unwrap();
        assert!(buf.peek_header().is_none());
        assert_eq!(buf.peek_length(), 0);

        push_packet(&mut buf, &packet(0x40, 5));
        let header = buf.peek_header().unwrap();
        assert_eq!(header.words(), &[0x40, 0x41]);
        assert_eq!(buf.peek_length(), 5);
        assert_eq!(buf.peek_length_bytes(), 20);

        drain_packet(&mut buf);
        assert!(buf.peek_header().is_none());
    }

    #[test]
    fn test_in_progress_packet_not_visible() {
        let mut buf = PacketBuffer::new(&NicConfig::compact()).unwrap();
        let words = packet(0, 4);
        buf.push(words[0]).unwrap();
        buf.push(words[1]).unwrap();
        assert!(buf.ingress_in_progress());
        assert!(!buf.can_pop());
        assert_eq!(buf.pending_packet_count(), 0);
        push_packet(&mut buf, &words[2..]);
        assert!(buf.can_pop());
    }

    #[test]
    fn test_malformed_word_drops_packet() {
        let mut buf = PacketBuffer::new(&NicConfig::compact()).unwrap();
        buf.push(StreamWord::new(1, 0x0F, false)).unwrap();
        assert_eq!(buf.push(StreamWord::new(2, 0x00, false)), Err(NicError::MalformedInput));
        buf.push(StreamWord::new(3, 0x0F, false)).unwrap();
        let end = buf.push(StreamWord::new(4, 0x0F, true)).unwrap();
        assert_eq!(end, PushOutcome::Dropped { reason: DropReason::Malformed, words: 4 });
        assert_eq!(buf.occupancy(), 0);
        assert_eq!(buf.stats().drops.malformed, 1);
    }

    #[test]
    fn test_keep_bits_beyond_word_ignored() {
        let mut buf = PacketBuffer::new(&NicConfig::compact()).unwrap();
        // Only the upper nibble set: no valid lane in a 4-byte word.
        assert_eq!(buf.push(StreamWord::new(1, 0xF0, true)), Err(NicError::MalformedInput));
        assert_eq!(buf.pending_packet_count(), 0);
    }

    #[test]
    fn test_wraparound_many_packets() {
        let mut buf = PacketBuffer::new(&NicConfig::compact()).unwrap();
        for n in 0..50u64 {
            let len = 2 + (n as usize % 7);
            let words = packet(n * 100, len);
            assert_eq!(push_packet(&mut buf, &words), PushOutcome::Committed { length: len });
            assert_eq!(drain_packet(&mut buf), words);
        }
        assert_eq!(buf.occupancy(), 0);
    }

    #[test]
    fn test_full_ring_reports_descriptor_busy() {
        let mut buf = PacketBuffer::new(&NicConfig::compact()).unwrap();
        push_packet(&mut buf, &packet(0, 8));
        push_packet(&mut buf, &packet(10, 8));
        assert_eq!(buf.occupancy(), buf.capacity());

        assert_eq!(
            push_packet(&mut buf, &packet(20, 3)),
            PushOutcome::Dropped { reason: DropReason::DescriptorBusy, words: 3 }
        );
        assert_eq!(buf.stats().drops.ring_full, 0);
        assert_eq!(buf.occupancy(), buf.capacity());
    }

    /// Deterministic xorshift for interleaving tests.
    struct Rng(u64);

    impl Rng {
        fn next(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0
        }
    }

    /// Pop one word, checking the captured header against the accepted
    /// packet whenever a new packet is about to start.
    fn pop_checked(
        buf: &mut PacketBuffer,
        accepted: &[Vec<StreamWord>],
        delivered: &mut Vec<Vec<StreamWord>>,
        current: &mut Vec<StreamWord>,
        headers: &mut usize,
    ) -> bool {
        if current.is_empty() {
            if let Some(header) = buf.peek_header() {
                let expected: Vec<Word> =
                    accepted[delivered.len()][..2].iter().map(|w| w.data).collect();
                assert_eq!(header.words(), &expected[..]);
                *headers += 1;
            }
        }
        match buf.pop() {
            Some(out) => {
                current.push(out);
                if out.last {
                    delivered.push(core::mem::take(current));
                }
                true
            }
            None => false,
        }
    }

    #[test]
    fn test_delivered_equals_accepted_under_random_drops() {
        let config = NicConfig::compact().packets(3, 24, 8);
        let mut buf = PacketBuffer::new(&config).unwrap();
        let mut rng = Rng(0x9E37_79B9_7F4A_7C15);

        let mut accepted: Vec<Vec<StreamWord>> = Vec::new();
        let mut delivered: Vec<Vec<StreamWord>> = Vec::new();
        let mut current: Vec<StreamWord> = Vec::new();
        let mut headers = 0;

        for n in 0..400u64 {
            let len = (rng.next() % 9) as usize + 1;
            let words = packet(n << 8, len);
            for &w in &words {
                if let PushOutcome::Committed { .. } = buf.push(w).unwrap() {
                    accepted.push(words.clone());
                }
                assert!(buf.pending_packet_count() <= buf.n_packets());
                assert!(buf.occupancy() <= buf.capacity());

                if rng.next() % 3 == 0 {
                    pop_checked(&mut buf, &accepted, &mut delivered, &mut current, &mut headers);
                }
            }
        }
        while pop_checked(&mut buf, &accepted, &mut delivered, &mut current, &mut headers) {}

        assert!(current.is_empty());
        assert_eq!(delivered, accepted);
        assert_eq!(headers, accepted.len());
        let stats = buf.stats();
        assert_eq!(stats.committed, accepted.len() as u64);
        assert!(stats.drops.total() > 0);
    }
}
