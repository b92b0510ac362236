//! Captured packet header.
//!
//! The packet buffer keeps the first `header_words` words of every
//! committed packet beside the ring so the consumer can inspect them
//! before draining the payload.

use alloc::vec::Vec;
use smoltcp::wire::{EthernetFrame, EthernetRepr};

use crate::word::Word;

/// Alignment padding ahead of the Ethernet header in the default
/// 16-byte header capture.
pub const ETH_PAD_BYTES: usize = 2;

/// Header words of the oldest pending packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader<'a> {
    words: &'a [Word],
    word_bytes: usize,
}

impl<'a> PacketHeader<'a> {
    pub(crate) fn new(words: &'a [Word], word_bytes: usize) -> Self {
        Self { words, word_bytes }
    }

    /// Raw header words.
    pub fn words(&self) -> &'a [Word] {
        self.words
    }

    /// Header length in bytes.
    pub fn len(&self) -> usize {
        self.words.len() * self.word_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Header bytes in wire order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for word in self.words {
            out.extend_from_slice(&word.to_le_bytes()[..self.word_bytes]);
        }
        out
    }

    /// Parse an Ethernet II header starting `offset` bytes into the capture.
    pub fn ethernet_at(&self, offset: usize) -> Option<EthernetRepr> {
        let bytes = self.to_bytes();
        let frame = EthernetFrame::new_checked(bytes.get(offset..)?).ok()?;
        EthernetRepr::parse(&frame).ok()
    }

    /// Parse the Ethernet II header behind the alignment padding.
    pub fn ethernet(&self) -> Option<EthernetRepr> {
        self.ethernet_at(ETH_PAD_BYTES)
    }
}
