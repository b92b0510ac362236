//! Receive-side DMA engine.
//!
//! Drains one packet from the packet buffer into host memory at a receive
//! address. Valid bytes are staged and written out in aligned power-of-two
//! chunks; once the packet's final word is in, the stage is flushed and the
//! completion reports how many bytes landed.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use log::{debug, trace};

use super::ids::{IdPool, TransferId};
use super::port::{MemoryPort, WriteAck};
use super::split::next_chunk;
use crate::config::NicConfig;
use crate::error::{NicError, Result};
use crate::word::StreamWord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Idle,
    /// Taking words of the current packet.
    Data,
    /// Final word taken; flushing the stage and collecting acks.
    Flush,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub packets: u64,
    pub words: u64,
    pub sub_writes: u64,
    pub bytes: u64,
}

#[derive(Debug)]
pub struct Writer {
    state: WriterState,
    base: u64,
    /// Bytes handed to the port so far.
    written: usize,
    /// Valid bytes received for the current packet.
    received: usize,
    stage: VecDeque<u8>,

    ids: IdPool,
    word_bytes: usize,
    max_bytes: usize,
    stats: WriterStats,
}

impl Writer {
    pub fn new(config: &NicConfig) -> Self {
        Self {
            state: WriterState::Idle,
            base: 0,
            written: 0,
            received: 0,
            stage: VecDeque::with_capacity(config.max_transfer_bytes + config.word_bytes()),
            ids: IdPool::new(config.n_transfer_ids),
            word_bytes: config.word_bytes(),
            max_bytes: config.max_transfer_bytes,
            stats: WriterStats::default(),
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == WriterState::Idle
    }

    pub fn in_flight(&self) -> usize {
        self.ids.in_flight()
    }

    pub fn stats(&self) -> WriterStats {
        self.stats
    }

    /// Begin receiving a packet into memory at `addr`.
    pub fn start(&mut self, addr: u64) -> Result<()> {
        if self.state != WriterState::Idle {
            return Err(NicError::Busy);
        }
        self.base = addr;
        self.written = 0;
        self.received = 0;
        self.state = WriterState::Data;
        trace!("writer: receive into {:#x}", addr);
        Ok(())
    }

    /// True when the writer can take another packet word this tick.
    pub fn wants_word(&self) -> bool {
        self.state == WriterState::Data && self.stage.len() < self.max_bytes
    }

    /// Stage the valid bytes of one packet word.
    pub fn accept_word(&mut self, word: StreamWord) {
        debug_assert!(
            self.state == WriterState::Data,
            "BUG: writer took a word while {:?}",
            self.state
        );
        let before = self.stage.len();
        word.extend_valid(self.word_bytes, &mut self.stage);
        self.received += self.stage.len() - before;
        self.stats.words += 1;
        if word.last {
            self.state = WriterState::Flush;
        }
    }

    /// Issue at most one sub-write.
    ///
    /// While the packet is still arriving a sub-write only goes out once a
    /// full transfer is staged; after the final word everything is flushed.
    pub fn issue<M: MemoryPort>(&mut self, port: &mut M) -> Option<TransferId> {
        let flushing = match self.state {
            WriterState::Idle => return None,
            WriterState::Data => false,
            WriterState::Flush => true,
        };
        if self.stage.is_empty() || (!flushing && self.stage.len() < self.max_bytes) {
            return None;
        }
        if !port.can_issue_write() {
            return None;
        }
        let id = self.ids.alloc()?;

        let addr = self.base + self.written as u64;
        let size = next_chunk(addr, self.stage.len(), 1, self.max_bytes);
        let data: Vec<u8> = self.stage.drain(..size).collect();
        port.issue_write(id, addr, &data);
        trace!("writer: id {} writes {} bytes at {:#x}", id, size, addr);

        self.written += size;
        self.stats.sub_writes += 1;
        Some(id)
    }

    /// Retire a write acknowledgement.
    pub fn accept_ack(&mut self, ack: WriteAck) -> Result<()> {
        if !self.ids.is_busy(ack.id) {
            return Err(NicError::InvalidTransferId);
        }
        self.ids.release(ack.id);
        Ok(())
    }

    /// Take the receive completion once the packet is fully written.
    pub fn take_completion(&mut self) -> Option<usize> {
        if self.state != WriterState::Flush || !self.stage.is_empty() || !self.ids.is_idle() {
            return None;
        }
        let length = self.received;
        debug!("writer: packet of {} bytes written at {:#x}", length, self.base);
        self.state = WriterState::Idle;
        self.stats.packets += 1;
        self.stats.bytes += length as u64;
        Some(length)
    }
}
