//! Stream word: the unit moved between data-plane components.
//!
//! A word carries up to eight byte lanes. Lane `i` lives in bits
//! `8*i..8*i+8` of `data`, and bit `i` of `keep` marks it valid.

use alloc::vec::Vec;

/// Raw word payload.
pub type Word = u64;

/// Byte-validity mask, one bit per lane.
pub type ByteMask = u8;

/// Mask with the low `word_bytes` lanes valid.
#[inline]
pub const fn full_keep(word_bytes: usize) -> ByteMask {
    ((1u16 << word_bytes) - 1) as ByteMask
}

/// Keep mask with lanes `offset..` valid.
#[inline]
pub const fn left_keep(offset: usize, word_bytes: usize) -> ByteMask {
    ((full_keep(word_bytes) as u16) << offset) as ByteMask & full_keep(word_bytes)
}

/// Keep mask with the top `slack` lanes invalid.
#[inline]
pub const fn right_keep(slack: usize, word_bytes: usize) -> ByteMask {
    full_keep(word_bytes) >> slack
}

/// One word of a stream, tagged with validity and end-of-packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamWord {
    pub data: Word,
    pub keep: ByteMask,
    pub last: bool,
}

impl StreamWord {
    pub const fn new(data: Word, keep: ByteMask, last: bool) -> Self {
        Self { data, keep, last }
    }

    /// Number of valid lanes.
    #[inline]
    pub const fn valid_bytes(&self) -> usize {
        self.keep.count_ones() as usize
    }

    /// True when at least one lane is valid.
    #[inline]
    pub const fn has_data(&self) -> bool {
        self.keep != 0
    }

    /// Value of lane `i`.
    #[inline]
    pub const fn lane(&self, i: usize) -> u8 {
        (self.data >> (8 * i)) as u8
    }

    /// Append the valid lanes, in lane order, to `out`.
    pub fn extend_valid(&self, word_bytes: usize, out: &mut impl Extend<u8>) {
        out.extend((0..word_bytes).filter(|&i| self.keep & (1 << i) != 0).map(|i| self.lane(i)));
    }

    /// Build a word from up to `word_bytes` bytes, filling lanes from 0.
    pub fn from_bytes(bytes: &[u8], last: bool) -> Self {
        debug_assert!(!bytes.is_empty() && bytes.len() <= 8);
        let mut data: Word = 0;
        for (i, &b) in bytes.iter().enumerate() {
            data |= (b as Word) << (8 * i);
        }
        Self::new(data, full_keep(bytes.len()), last)
    }
}

/// Split a frame into stream words; the final word is marked `last`.
pub fn frame_to_words(frame: &[u8], word_bytes: usize) -> Vec<StreamWord> {
    let n = frame.chunks(word_bytes).count();
    frame
        .chunks(word_bytes)
        .enumerate()
        .map(|(i, chunk)| StreamWord::from_bytes(chunk, i + 1 == n))
        .collect()
}

/// Reassemble the valid bytes of a word stream.
pub fn words_to_frame(words: &[StreamWord], word_bytes: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * word_bytes);
    for word in words {
        word.extend_valid(word_bytes, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keep_masks() {
        assert_eq!(full_keep(8), 0xFF);
        assert_eq!(full_keep(4), 0x0F);
        assert_eq!(left_keep(1, 4), 0x0E);
        assert_eq!(left_keep(0, 8), 0xFF);
        assert_eq!(right_keep(3, 4), 0x01);
        assert_eq!(right_keep(0, 8), 0xFF);
        assert_eq!(left_keep(2, 4) & right_keep(1, 4), 0x04);
    }

    #[test]
    fn test_frame_split_marks_last() {
        let frame: Vec<u8> = (0u8..10).collect();
        let words = frame_to_words(&frame, 4);
        assert_eq!(words.len(), 3);
        assert!(!words[0].last && !words[1].last && words[2].last);
        assert_eq!(words[0].data, 0x0302_0100);
        assert_eq!(words[2].keep, 0x03);
        assert_eq!(words_to_frame(&words, 4), frame);
    }

    #[test]
    fn test_extend_valid_skips_masked_lanes() {
        let word = StreamWord::new(0x4433_2211, 0b0110, false);
        let mut out = Vec::new();
        word.extend_valid(4, &mut out);
        assert_eq!(out, [0x22, 0x33]);
        assert_eq!(word.valid_bytes(), 2);
    }
}
