//! The data-plane engine.
//!
//! # Tick Structure
//! 1. Ingress: push the word arriving from the link into the packet buffer
//! 2. Receive DMA: start a receive, move one packet word, issue a sub-write
//! 3. Memory completions: one read beat and one write ack
//! 4. Send DMA: start a send, issue a sub-read
//! 5. Egress: one reassembled word to the link, paced by the rate limiter
//!
//! Every component advances at most once per tick.

use alloc::sync::Arc;
use log::{debug, warn};
use spin::Mutex;

use crate::config::{NicConfig, RateLimit};
use crate::control::{ControlQueues, NicHandle};
use crate::dma::{MemoryPort, Reader, ReaderStats, Writer, WriterStats};
use crate::error::{NicError, Result};
use crate::events::EventLog;
use crate::packet_buffer::{PacketBuffer, PacketBufferStats};
use crate::rate_limiter::RateLimiter;
use crate::reservation::ReservationBuffer;
use crate::word::StreamWord;

/// Engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NicStats {
    pub ticks: u64,
    /// Words sent to the link.
    pub tx_words: u64,
    /// Words taken from the link.
    pub rx_words: u64,
    /// Send requests rejected as empty.
    pub bad_sends: u64,
    pub rx: PacketBufferStats,
    pub reader: ReaderStats,
    pub writer: WriterStats,
}

/// NIC data plane over a memory port.
pub struct Nic<M: MemoryPort> {
    config: NicConfig,
    mem: M,
    rx_buffer: PacketBuffer,
    resv: ReservationBuffer<StreamWord>,
    reader: Reader,
    writer: Writer,
    limiter: RateLimiter,
    queues: Arc<Mutex<ControlQueues>>,
    ticks: u64,
    tx_words: u64,
    rx_words: u64,
    bad_sends: u64,
}

impl<M: MemoryPort> Nic<M> {
    /// Build the engine. Fails with `InvalidConfig` on a bad geometry.
    pub fn new(config: NicConfig, mem: M) -> Result<Self> {
        config.validate()?;
        let rx_buffer = PacketBuffer::new(&config)?;
        debug!(
            "nic: {}-bit words, {} packets of <= {} bytes, {} transfer ids",
            config.word_bits, config.n_packets, config.max_packet_bytes, config.n_transfer_ids
        );
        Ok(Self {
            rx_buffer,
            resv: ReservationBuffer::new(config.n_transfer_ids, config.reservation_words),
            reader: Reader::new(&config),
            writer: Writer::new(&config),
            limiter: RateLimiter::new(config.rate_limit),
            queues: Arc::new(Mutex::new(ControlQueues::new(config.queue_depth))),
            mem,
            config,
            ticks: 0,
            tx_words: 0,
            rx_words: 0,
            bad_sends: 0,
        })
    }

    /// Software handle to the control queues.
    pub fn handle(&self) -> NicHandle {
        NicHandle::new(Arc::clone(&self.queues))
    }

    pub fn config(&self) -> &NicConfig {
        &self.config
    }

    pub fn memory(&self) -> &M {
        &self.mem
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.mem
    }

    pub fn packet_buffer(&self) -> &PacketBuffer {
        &self.rx_buffer
    }

    /// Dropped-packet event log.
    pub fn events(&mut self) -> &mut EventLog {
        self.rx_buffer.events()
    }

    /// Replace the egress pacing.
    pub fn set_rate_limit(&mut self, settings: RateLimit) {
        self.config.rate_limit = settings;
        self.limiter.set(settings);
    }

    pub fn stats(&self) -> NicStats {
        NicStats {
            ticks: self.ticks,
            tx_words: self.tx_words,
            rx_words: self.rx_words,
            bad_sends: self.bad_sends,
            rx: self.rx_buffer.stats(),
            reader: self.reader.stats(),
            writer: self.writer.stats(),
        }
    }

    /// Advance one tick. `rx` is the word arriving from the link, if any;
    /// the return value is the word leaving on the link.
    pub fn step(&mut self, rx: Option<StreamWord>) -> Option<StreamWord> {
        self.ticks += 1;
        let queues = Arc::clone(&self.queues);
        let mut q = queues.lock();

        if let Some(word) = rx {
            self.ingress(word);
        }
        self.receive_dma(&mut q);
        self.memory_completions(&mut q);
        self.send_dma(&mut q);
        self.egress()
    }

    fn ingress(&mut self, word: StreamWord) {
        self.rx_words += 1;
        // Malformed words are logged and counted by the packet buffer.
        if let Err(e) = self.rx_buffer.push(word) {
            debug!("nic: ingress word rejected: {}", e);
        }
    }

    fn receive_dma(&mut self, q: &mut ControlQueues) {
        if self.writer.is_idle() && self.rx_buffer.can_pop() {
            if let Some(addr) = q.recv_req.dequeue() {
                if let Err(e) = self.writer.start(addr) {
                    warn!("nic: receive start failed: {}", e);
                }
            }
        }
        if self.writer.wants_word() {
            if let Some(word) = self.rx_buffer.pop() {
                self.writer.accept_word(word);
            }
        }
        self.writer.issue(&mut self.mem);
    }

    fn memory_completions(&mut self, q: &mut ControlQueues) {
        if let Some(beat) = self.mem.poll_read() {
            if let Err(e) = self.reader.accept_beat(beat, &mut self.resv) {
                warn!("nic: read beat for id {} dropped: {}", beat.id, e);
            }
        }
        if let Some(ack) = self.mem.poll_write() {
            if let Err(e) = self.writer.accept_ack(ack) {
                warn!("nic: write ack for id {} dropped: {}", ack.id, e);
            }
        }

        if !q.send_comp.is_full() {
            if let Some(done) = self.reader.take_completion() {
                complete(&mut q.send_comp, done);
            }
        }
        if !q.recv_comp.is_full() {
            if let Some(length) = self.writer.take_completion() {
                complete(&mut q.recv_comp, length);
            }
        }
    }

    fn send_dma(&mut self, q: &mut ControlQueues) {
        if self.reader.is_idle() && !q.send_comp.is_full() {
            if let Some(req) = q.send_req.dequeue() {
                if let Err(e) = self.reader.start(req) {
                    warn!("nic: send {:#x}+{} rejected: {}", req.addr, req.len, e);
                    self.bad_sends += 1;
                    complete(&mut q.send_comp, false);
                }
            }
        }
        self.reader.issue(&mut self.mem, &mut self.resv);
    }

    fn egress(&mut self) -> Option<StreamWord> {
        self.limiter.tick();
        if !self.limiter.ready() {
            return None;
        }
        let word = self.resv.consume()?;
        self.limiter.consume();
        self.tx_words += 1;
        Some(word)
    }

    /// True when no work can progress without new input from the link or
    /// software.
    pub fn is_idle(&self) -> bool {
        let q = self.queues.lock();
        let engines_idle = self.reader.is_idle()
            && self.reader.in_flight() == 0
            && self.resv.is_empty()
            && self.writer.is_idle()
            && self.writer.in_flight() == 0;
        let receive_blocked = !self.rx_buffer.can_pop() || q.recv_req.is_empty();
        engines_idle && q.send_req.is_empty() && receive_blocked
    }

    /// Step with an idle link until `is_idle`, handing egress words to `tx`.
    ///
    /// Returns the ticks taken, or `None` if `max_ticks` ran out first.
    pub fn run_until_idle(
        &mut self,
        max_ticks: usize,
        mut tx: impl FnMut(StreamWord),
    ) -> Option<usize> {
        for tick in 0..max_ticks {
            if self.is_idle() {
                return Some(tick);
            }
            if let Some(word) = self.step(None) {
                tx(word);
            }
        }
        self.is_idle().then_some(max_ticks)
    }
}

/// Enqueue a completion into a queue already checked for space.
fn complete<T>(queue: &mut crate::control::BoundedQueue<T>, item: T) {
    if queue.enqueue(item).is_err() {
        warn!("nic: completion lost: {}", NicError::QueueFull);
    }
}

/// A NIC whose egress is wired straight back into its ingress.
pub struct Loopback<M: MemoryPort> {
    nic: Nic<M>,
    wire: Option<StreamWord>,
}

impl<M: MemoryPort> Loopback<M> {
    pub fn new(nic: Nic<M>) -> Self {
        Self { nic, wire: None }
    }

    pub fn nic(&self) -> &Nic<M> {
        &self.nic
    }

    pub fn nic_mut(&mut self) -> &mut Nic<M> {
        &mut self.nic
    }

    pub fn into_inner(self) -> Nic<M> {
        self.nic
    }

    pub fn step(&mut self) {
        let rx = self.wire.take();
        self.wire = self.nic.step(rx);
    }

    pub fn is_idle(&self) -> bool {
        self.wire.is_none() && self.nic.is_idle()
    }

    /// Returns the ticks taken, or `None` if `max_ticks` ran out first.
    pub fn run_until_idle(&mut self, max_ticks: usize) -> Option<usize> {
        for tick in 0..max_ticks {
            if self.is_idle() {
                return Some(tick);
            }
            self.step();
        }
        self.is_idle().then_some(max_ticks)
    }
}
