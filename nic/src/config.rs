//! Data-plane configuration.
//!
//! Every size here is fixed when the components are built; nothing is
//! reconfigured at runtime.

use crate::error::{NicError, Result};

/// Largest Ethernet frame (with VLAN tag and FCS) buffered by default.
pub const ETH_MAX_BYTES: usize = 1520;

/// Ethernet header padded to a word multiple (2 pad bytes + 14 header bytes).
pub const ETH_HEAD_BYTES: usize = 16;

/// Upper bound on concurrently outstanding DMA transfer ids.
///
/// Busy ids are tracked in a `u32` bitmap.
pub const MAX_TRANSFER_IDS: usize = 32;

/// Token-bucket settings for egress pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Tokens added each refill.
    pub inc: u32,
    /// Ticks between refills. Zero disables the limiter.
    pub period: u32,
    /// Bucket capacity.
    pub size: u32,
}

impl RateLimit {
    /// No pacing; every egress word goes out as soon as it is available.
    pub const UNLIMITED: Self = Self { inc: 1, period: 0, size: 1 };

    pub const fn is_unlimited(&self) -> bool {
        self.period == 0
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::UNLIMITED
    }
}

/// NIC data-plane configuration.
#[derive(Debug, Clone)]
pub struct NicConfig {
    /// Width of one stream word in bits (8, 16, 32 or 64).
    pub word_bits: usize,
    /// Number of complete packets the packet buffer can hold.
    pub n_packets: usize,
    /// Largest packet accepted, in bytes.
    pub max_packet_bytes: usize,
    /// Header bytes captured per packet. Also the minimum packet size.
    pub header_bytes: usize,
    /// Concurrently outstanding DMA transfer ids.
    pub n_transfer_ids: usize,
    /// Reservation ring size in words.
    pub reservation_words: usize,
    /// Largest single DMA sub-transfer in bytes (power of two).
    pub max_transfer_bytes: usize,
    /// Depth of each control request/completion queue.
    pub queue_depth: usize,
    /// Egress pacing.
    pub rate_limit: RateLimit,
}

impl Default for NicConfig {
    fn default() -> Self {
        Self {
            word_bits: 64,
            n_packets: 4,
            max_packet_bytes: ETH_MAX_BYTES,
            header_bytes: ETH_HEAD_BYTES,
            n_transfer_ids: 8,
            reservation_words: 64,
            max_transfer_bytes: 64,
            queue_depth: 16,
            rate_limit: RateLimit::UNLIMITED,
        }
    }
}

impl NicConfig {
    /// Small geometry for exercising drop paths: 32-bit words, two packets
    /// of at most 8 words, 2-word header.
    pub fn compact() -> Self {
        Self {
            word_bits: 32,
            n_packets: 2,
            max_packet_bytes: 32,
            header_bytes: 8,
            n_transfer_ids: 2,
            reservation_words: 16,
            max_transfer_bytes: 16,
            queue_depth: 4,
            rate_limit: RateLimit::UNLIMITED,
        }
    }

    /// Set word width.
    pub fn word_bits(mut self, bits: usize) -> Self {
        self.word_bits = bits;
        self
    }

    /// Set packet buffer geometry.
    pub fn packets(
        mut self,
        n_packets: usize,
        max_packet_bytes: usize,
        header_bytes: usize,
    ) -> Self {
        self.n_packets = n_packets;
        self.max_packet_bytes = max_packet_bytes;
        self.header_bytes = header_bytes;
        self
    }

    /// Set reservation geometry.
    pub fn transfers(mut self, n_transfer_ids: usize, reservation_words: usize) -> Self {
        self.n_transfer_ids = n_transfer_ids;
        self.reservation_words = reservation_words;
        self
    }

    /// Set maximum DMA sub-transfer size.
    pub fn max_transfer(mut self, bytes: usize) -> Self {
        self.max_transfer_bytes = bytes;
        self
    }

    /// Set control queue depth.
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Set egress pacing.
    pub fn rate_limit(mut self, inc: u32, period: u32, size: u32) -> Self {
        self.rate_limit = RateLimit { inc, period, size };
        self
    }

    /// Bytes per stream word.
    pub const fn word_bytes(&self) -> usize {
        self.word_bits / 8
    }

    /// Maximum words in one packet.
    pub const fn max_words(&self) -> usize {
        (self.max_packet_bytes + self.word_bytes() - 1) / self.word_bytes()
    }

    /// Words captured as header.
    pub const fn header_words(&self) -> usize {
        self.header_bytes / self.word_bytes()
    }

    /// Packet ring capacity in words.
    pub const fn ring_words(&self) -> usize {
        self.max_words() * self.n_packets
    }

    /// Check the configuration is internally consistent.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.word_bits, 8 | 16 | 32 | 64) {
            return Err(NicError::InvalidConfig("word_bits must be 8, 16, 32 or 64"));
        }
        let word_bytes = self.word_bytes();
        if self.n_packets == 0 {
            return Err(NicError::InvalidConfig("n_packets must be non-zero"));
        }
        if self.header_bytes < word_bytes || self.header_bytes % word_bytes != 0 {
            return Err(NicError::InvalidConfig("header_bytes must be a non-zero word multiple"));
        }
        if self.max_packet_bytes < self.header_bytes {
            return Err(NicError::InvalidConfig("max_packet_bytes smaller than header"));
        }
        if self.n_transfer_ids == 0 || self.n_transfer_ids > MAX_TRANSFER_IDS {
            return Err(NicError::InvalidConfig("n_transfer_ids out of range"));
        }
        if !self.max_transfer_bytes.is_power_of_two() || self.max_transfer_bytes < word_bytes {
            return Err(NicError::InvalidConfig(
                "max_transfer_bytes must be a power of two >= word",
            ));
        }
        if self.reservation_words < self.max_transfer_bytes / word_bytes {
            return Err(NicError::InvalidConfig("reservation ring cannot hold one transfer"));
        }
        if self.queue_depth == 0 {
            return Err(NicError::InvalidConfig("queue_depth must be non-zero"));
        }
        let rate = self.rate_limit;
        if !rate.is_unlimited() && (rate.inc == 0 || rate.size == 0) {
            return Err(NicError::InvalidConfig("rate limit never grants tokens"));
        }
        Ok(())
    }
}
