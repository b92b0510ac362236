//! Send-side DMA engine.
//!
//! Turns a send request into word-aligned sub-reads, reserves room for each
//! in the reservation buffer before issuing it, and writes returning beats
//! into their reserved slots with byte masks trimming the request to its
//! exact byte range.
//!
//! ```text
//!   Idle ──start──► Requesting ──last sub-read──► AwaitingCompletion
//!    ▲                                                   │
//!    └──────────────────── take_completion ◄─────────────┘
//! ```

use alloc::vec;
use alloc::vec::Vec;
use log::{debug, trace};

use super::ids::{IdPool, TransferId};
use super::port::{MemoryPort, ReadBeat};
use super::split::next_chunk;
use crate::config::NicConfig;
use crate::control::SendRequest;
use crate::error::{NicError, Result};
use crate::reservation::ReservationBuffer;
use crate::word::{full_keep, left_keep, right_keep, ByteMask, StreamWord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Idle,
    /// Sub-reads of the current request remain to be issued.
    Requesting,
    /// All sub-reads issued; the send completion is waiting to be taken.
    AwaitingCompletion,
}

/// Per-id bookkeeping for one outstanding sub-read.
#[derive(Debug, Clone, Copy, Default)]
struct ReadXact {
    beats_left: usize,
    first_beat: bool,
    left_keep: ByteMask,
    right_keep: ByteMask,
    ends_packet: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub requests: u64,
    pub sub_reads: u64,
    pub beats: u64,
    /// Ticks a sub-read waited for reservation space.
    pub stalls: u64,
}

#[derive(Debug)]
pub struct Reader {
    state: ReaderState,
    /// Next word-aligned address to read.
    addr: u64,
    /// Word-aligned bytes still to request.
    remaining: usize,
    partial: bool,
    first_sub: bool,
    left_offset: usize,
    right_slack: usize,

    ids: IdPool,
    xacts: Vec<ReadXact>,
    word_bytes: usize,
    max_bytes: usize,
    stats: ReaderStats,
}

impl Reader {
    pub fn new(config: &NicConfig) -> Self {
        Self {
            state: ReaderState::Idle,
            addr: 0,
            remaining: 0,
            partial: false,
            first_sub: false,
            left_offset: 0,
            right_slack: 0,
            ids: IdPool::new(config.n_transfer_ids),
            xacts: vec![ReadXact::default(); config.n_transfer_ids],
            word_bytes: config.word_bytes(),
            max_bytes: config.max_transfer_bytes,
            stats: ReaderStats::default(),
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == ReaderState::Idle
    }

    /// Sub-reads still waiting for beats.
    pub fn in_flight(&self) -> usize {
        self.ids.in_flight()
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Begin a send request.
    ///
    /// # Returns
    /// - `Err(NicError::Busy)`: a request is already being issued
    /// - `Err(NicError::MalformedInput)`: zero-length request
    pub fn start(&mut self, req: SendRequest) -> Result<()> {
        if self.state != ReaderState::Idle {
            return Err(NicError::Busy);
        }
        if req.len == 0 {
            return Err(NicError::MalformedInput);
        }

        let wb = self.word_bytes as u64;
        let end = req.addr + req.len as u64;
        let start_word = req.addr / wb * wb;
        let end_word = (end + wb - 1) / wb * wb;

        self.addr = start_word;
        self.remaining = (end_word - start_word) as usize;
        self.partial = req.partial;
        self.first_sub = true;
        self.left_offset = (req.addr - start_word) as usize;
        self.right_slack = (end_word - end) as usize;
        self.state = ReaderState::Requesting;
        self.stats.requests += 1;
        debug!(
            "reader: send {:#x}+{} as {} aligned bytes{}",
            req.addr,
            req.len,
            self.remaining,
            if req.partial { " (partial)" } else { "" }
        );
        Ok(())
    }

    /// Issue at most one sub-read.
    ///
    /// Stalls, returning `None`, when no id is free, the port is not ready,
    /// or the reservation buffer cannot hold the sub-read's beats.
    pub fn issue<M: MemoryPort>(
        &mut self,
        port: &mut M,
        resv: &mut ReservationBuffer<StreamWord>,
    ) -> Option<TransferId> {
        if self.state != ReaderState::Requesting || !port.can_issue_read() {
            return None;
        }
        let id = self.ids.peek_free()?;
        let size = next_chunk(self.addr, self.remaining, self.word_bytes, self.max_bytes);
        let beats = size / self.word_bytes;
        if resv.allocate(id, beats).is_err() {
            self.stats.stalls += 1;
            return None;
        }

        self.ids.mark_busy(id);
        port.issue_read(id, self.addr, size);

        let full = full_keep(self.word_bytes);
        let is_final = size == self.remaining;
        let left = if self.first_sub {
            left_keep(self.left_offset, self.word_bytes)
        } else {
            full
        };
        let right = if is_final {
            right_keep(self.right_slack, self.word_bytes)
        } else {
            full
        };
        self.xacts[id] = ReadXact {
            beats_left: beats,
            first_beat: true,
            left_keep: left,
            right_keep: right,
            ends_packet: is_final && !self.partial,
        };
        trace!("reader: id {} reads {} bytes at {:#x}", id, size, self.addr);

        self.first_sub = false;
        self.addr += size as u64;
        self.remaining -= size;
        self.stats.sub_reads += 1;
        if is_final {
            self.state = ReaderState::AwaitingCompletion;
        }
        Some(id)
    }

    /// Place a returning beat in its reserved slot.
    pub fn accept_beat(
        &mut self,
        beat: ReadBeat,
        resv: &mut ReservationBuffer<StreamWord>,
    ) -> Result<()> {
        if !self.ids.is_busy(beat.id) {
            return Err(NicError::InvalidTransferId);
        }
        let xact = self.xacts[beat.id];
        let mut keep = full_keep(self.word_bytes);
        if xact.first_beat {
            keep &= xact.left_keep;
        }
        let final_beat = xact.beats_left == 1;
        if final_beat {
            keep &= xact.right_keep;
        }

        let last = final_beat && xact.ends_packet;
        resv.write(beat.id, StreamWord::new(beat.data, keep, last))?;
        let xact = &mut self.xacts[beat.id];
        xact.first_beat = false;
        xact.beats_left -= 1;
        self.stats.beats += 1;
        if final_beat {
            self.ids.release(beat.id);
        }
        Ok(())
    }

    /// Take the send completion once every sub-read has been issued.
    pub fn take_completion(&mut self) -> Option<bool> {
        if self.state != ReaderState::AwaitingCompletion {
            return None;
        }
        self.state = ReaderState::Idle;
        Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dma::port::{CompletionOrder, SimMemory};
    use crate::word::words_to_frame;

    const ORDERS: [CompletionOrder; 3] =
        [CompletionOrder::Fifo, CompletionOrder::Lifo, CompletionOrder::RoundRobin];

    fn config() -> NicConfig {
        NicConfig::default().transfers(4, 32).max_transfer(32)
    }

    /// Run one request to completion, draining the reservation buffer.
    fn run(
        order: CompletionOrder,
        config: &NicConfig,
        req: SendRequest,
        bytes: &[u8],
    ) -> Vec<StreamWord> {
        let mut mem = SimMemory::new(1024, config.word_bytes()).with_order(order);
        mem.load(0, bytes);
        let mut resv = ReservationBuffer::new(config.n_transfer_ids, config.reservation_words);
        let mut reader = Reader::new(config);
        reader.start(req).unwrap();

        let mut out = Vec::new();
        let mut done = false;
        for _ in 0..1000 {
            reader.issue(&mut mem, &mut resv);
            // Let a few sub-reads pile up before answering.
            if mem.outstanding_reads() >= 2 || reader.state() != ReaderState::Requesting {
                if let Some(beat) = mem.poll_read() {
                    reader.accept_beat(beat, &mut resv).unwrap();
                }
            }
            if let Some(word) = resv.consume() {
                out.push(word);
            }
            if reader.take_completion().is_some() {
                done = true;
            }
            if done && reader.in_flight() == 0 && resv.is_empty() {
                break;
            }
        }
        assert!(done && reader.is_idle());
        out
    }

    #[test]
    fn test_aligned_request_all_orders() {
        let bytes: Vec<u8> = (0..200u32).map(|i| i as u8).collect();
        let config = config();
        for order in ORDERS {
            let words = run(order, &config, SendRequest::new(0, 200, false), &bytes);
            assert_eq!(words.len(), 25);
            assert!(words[..24].iter().all(|w| !w.last));
            assert!(words[24].last);
            assert_eq!(words_to_frame(&words, 8), bytes);
        }
    }

    #[test]
    fn test_unaligned_request_masks_both_ends() {
        let bytes: Vec<u8> = (0..128u32).map(|i| (i * 3) as u8).collect();
        let config = config();
        for order in ORDERS {
            let words = run(order, &config, SendRequest::new(3, 70, false), &bytes);
            // 3..73 spans words 0..10
            assert_eq!(words.len(), 10);
            assert_eq!(words[0].keep, 0xF8);
            assert_eq!(words[9].keep, 0x01);
            assert_eq!(words_to_frame(&words, 8), &bytes[3..73]);
        }
    }

    #[test]
    fn test_single_word_request_combines_masks() {
        let bytes: Vec<u8> = (0u8..16).collect();
        let config = NicConfig::compact();
        let words = run(CompletionOrder::Fifo, &config, SendRequest::new(1, 2, false), &bytes);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].keep, 0b0110);
        assert!(words[0].last);
        assert_eq!(words_to_frame(&words, 4), [1, 2]);
    }

    #[test]
    fn test_partial_request_has_no_last() {
        let bytes = [0xAAu8; 64];
        let words = run(CompletionOrder::Fifo, &config(), SendRequest::new(0, 64, true), &bytes);
        assert!(words.iter().all(|w| !w.last));
    }

    #[test]
    fn test_busy_and_empty_requests() {
        let mut reader = Reader::new(&config());
        assert_eq!(reader.start(SendRequest::new(0, 0, false)), Err(NicError::MalformedInput));
        reader.start(SendRequest::new(0, 8, false)).unwrap();
        assert_eq!(reader.start(SendRequest::new(0, 8, false)), Err(NicError::Busy));
        assert_eq!(reader.take_completion(), None);
    }

    #[test]
    fn test_stalls_on_reservation_space() {
        let config = NicConfig::default().transfers(4, 4).max_transfer(32);
        let mut mem = SimMemory::new(256, 8);
        let mut resv = ReservationBuffer::new(4, 4);
        let mut reader = Reader::new(&config);
        reader.start(SendRequest::new(0, 64, false)).unwrap();

        assert_eq!(reader.issue(&mut mem, &mut resv), Some(0));
        assert_eq!(reader.issue(&mut mem, &mut resv), None);
        assert_eq!(reader.stats().stalls, 1);
        assert_eq!(resv.len(), 4);

        while let Some(beat) = mem.poll_read() {
            reader.accept_beat(beat, &mut resv).unwrap();
        }
        while resv.consume().is_some() {}
        assert_eq!(reader.issue(&mut mem, &mut resv), Some(0));
        assert_eq!(reader.state(), ReaderState::AwaitingCompletion);
    }

    #[test]
    fn test_stalls_when_ids_exhausted() {
        let config = NicConfig::default().transfers(2, 64).max_transfer(8);
        let mut mem = SimMemory::new(256, 8);
        let mut resv = ReservationBuffer::new(2, 64);
        let mut reader = Reader::new(&config);
        reader.start(SendRequest::new(0, 32, false)).unwrap();

        assert_eq!(reader.issue(&mut mem, &mut resv), Some(0));
        assert_eq!(reader.issue(&mut mem, &mut resv), Some(1));
        assert_eq!(reader.issue(&mut mem, &mut resv), None);
        let beat = mem.poll_read().unwrap();
        reader.accept_beat(beat, &mut resv).unwrap();
        assert_eq!(reader.issue(&mut mem, &mut resv), Some(0));
    }

    #[test]
    fn test_failed_beat_leaves_transfer_unchanged() {
        let config = config();
        let mut mem = SimMemory::new(256, 8);
        mem.load(0, &(0u8..64).collect::<Vec<u8>>());
        let mut resv = ReservationBuffer::new(4, 32);
        let mut other = ReservationBuffer::new(4, 32);
        let mut reader = Reader::new(&config);
        reader.start(SendRequest::new(3, 13, false)).unwrap();
        assert_eq!(reader.issue(&mut mem, &mut resv), Some(0));

        let beat = mem.poll_read().unwrap();
        assert_eq!(reader.accept_beat(beat, &mut other), Err(NicError::NoReservation));
        assert_eq!(reader.stats().beats, 0);

        // Retrying into the right buffer still applies the first-beat mask.
        reader.accept_beat(beat, &mut resv).unwrap();
        reader.accept_beat(mem.poll_read().unwrap(), &mut resv).unwrap();
        let words = [resv.consume().unwrap(), resv.consume().unwrap()];
        assert_eq!(words[0].keep, 0xF8);
        assert_eq!(words[1].keep, 0xFF);
        assert!(words[1].last);
        assert_eq!(words_to_frame(&words, 8), (3u8..16).collect::<Vec<u8>>());
        assert_eq!(reader.in_flight(), 0);
    }

    #[test]
    fn test_beat_for_idle_id_rejected() {
        let mut reader = Reader::new(&config());
        let mut resv = ReservationBuffer::new(4, 32);
        assert_eq!(
            reader.accept_beat(ReadBeat { id: 2, data: 0 }, &mut resv),
            Err(NicError::InvalidTransferId)
        );
    }
}
