//! Memory port interface and a simulated backing memory.

use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;

use super::ids::TransferId;
use crate::word::Word;

/// One beat of read data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadBeat {
    pub id: TransferId,
    pub data: Word,
}

/// Acknowledgement of a completed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteAck {
    pub id: TransferId,
}

/// Host memory as seen by the DMA engines.
///
/// Reads return data one word-sized beat at a time. Beats of one transfer id
/// arrive in address order; beats of different ids may interleave in any
/// order.
pub trait MemoryPort {
    /// Check if a read can be issued this tick.
    fn can_issue_read(&self) -> bool {
        true
    }

    /// Check if a write can be issued this tick.
    fn can_issue_write(&self) -> bool {
        true
    }

    /// Start a read of `len` bytes at `addr`.
    ///
    /// # Contract
    /// - `addr` and `len` are word-aligned and `len > 0`
    /// - only called when `can_issue_read()` is true
    fn issue_read(&mut self, id: TransferId, addr: u64, len: usize);

    /// Start a write of `data` at `addr`.
    ///
    /// # Contract
    /// - `data.len()` is a power of two and `addr` is aligned to it
    /// - only called when `can_issue_write()` is true
    fn issue_write(&mut self, id: TransferId, addr: u64, data: &[u8]);

    /// Next read beat, if one is ready.
    fn poll_read(&mut self) -> Option<ReadBeat>;

    /// Next write acknowledgement, if one is ready.
    fn poll_write(&mut self) -> Option<WriteAck>;
}

/// Order in which `SimMemory` returns beats of concurrent transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionOrder {
    /// Oldest transfer first.
    #[default]
    Fifo,
    /// Newest transfer first.
    Lifo,
    /// One beat from each outstanding transfer in turn.
    RoundRobin,
}

#[derive(Debug)]
struct PendingRead {
    id: TransferId,
    beats: VecDeque<Word>,
}

/// Flat byte-addressed memory answering requests immediately, in a
/// configurable completion order.
#[derive(Debug)]
pub struct SimMemory {
    mem: Vec<u8>,
    word_bytes: usize,
    order: CompletionOrder,
    reads: VecDeque<PendingRead>,
    acks: VecDeque<WriteAck>,
    rr_next: usize,
    /// Reads and writes issued since creation.
    pub issued_reads: u64,
    pub issued_writes: u64,
}

impl SimMemory {
    /// Create a zeroed memory of `size` bytes with `word_bytes`-wide beats.
    pub fn new(size: usize, word_bytes: usize) -> Self {
        Self {
            mem: vec![0; size],
            word_bytes,
            order: CompletionOrder::Fifo,
            reads: VecDeque::new(),
            acks: VecDeque::new(),
            rr_next: 0,
            issued_reads: 0,
            issued_writes: 0,
        }
    }

    /// Set the completion order.
    pub fn with_order(mut self, order: CompletionOrder) -> Self {
        self.order = order;
        self
    }

    pub fn size(&self) -> usize {
        self.mem.len()
    }

    fn range(&self, addr: u64, len: usize) -> core::ops::Range<usize> {
        let start = addr as usize;
        assert!(
            start.checked_add(len).map_or(false, |end| end <= self.mem.len()),
            "BUG: access {:#x}+{} outside simulated memory",
            addr,
            len
        );
        start..start + len
    }

    /// Copy `bytes` into memory at `addr`.
    pub fn load(&mut self, addr: u64, bytes: &[u8]) {
        let range = self.range(addr, bytes.len());
        self.mem[range].copy_from_slice(bytes);
    }

    /// View `len` bytes at `addr`.
    pub fn bytes(&self, addr: u64, len: usize) -> &[u8] {
        &self.mem[self.range(addr, len)]
    }

    /// Reads with beats still to deliver.
    pub fn outstanding_reads(&self) -> usize {
        self.reads.len()
    }

    /// Writes not yet acknowledged.
    pub fn outstanding_writes(&self) -> usize {
        self.acks.len()
    }

    fn next_read_index(&mut self) -> usize {
        match self.order {
            CompletionOrder::Fifo => 0,
            CompletionOrder::Lifo => self.reads.len() - 1,
            CompletionOrder::RoundRobin => {
                let idx = self.rr_next % self.reads.len();
                self.rr_next = idx + 1;
                idx
            }
        }
    }
}

impl MemoryPort for SimMemory {
    fn issue_read(&mut self, id: TransferId, addr: u64, len: usize) {
        debug_assert!(len > 0 && len % self.word_bytes == 0, "BUG: unaligned read length {}", len);
        let range = self.range(addr, len);
        let beats = self.mem[range]
            .chunks(self.word_bytes)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf[..chunk.len()].copy_from_slice(chunk);
                Word::from_le_bytes(buf)
            })
            .collect();
        self.reads.push_back(PendingRead { id, beats });
        self.issued_reads += 1;
    }

    fn issue_write(&mut self, id: TransferId, addr: u64, data: &[u8]) {
        debug_assert!(
            data.len().is_power_of_two() && addr % data.len() as u64 == 0,
            "BUG: unaligned write of {} bytes at {:#x}",
            data.len(),
            addr
        );
        self.load(addr, data);
        self.acks.push_back(WriteAck { id });
        self.issued_writes += 1;
    }

    fn poll_read(&mut self) -> Option<ReadBeat> {
        if self.reads.is_empty() {
            return None;
        }
        let idx = self.next_read_index();
        let read = &mut self.reads[idx];
        let id = read.id;
        let data = read.beats.pop_front()?;
        if read.beats.is_empty() {
            self.reads.remove(idx);
        }
        Some(ReadBeat { id, data })
    }

    fn poll_write(&mut self) -> Option<WriteAck> {
        match self.order {
            CompletionOrder::Lifo => self.acks.pop_back(),
            _ => self.acks.pop_front(),
        }
    }
}
