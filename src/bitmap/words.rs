use super::{bitmask_for_key, index_for_key, word_count, zeroed_words};
use crate::error::Result;

/// A plain, heap-allocated, `O(1)` indexed bitmap of `bit_width` bits packed
/// into `u64` words.
///
/// Bit `i` lives in word `i / 64` at bit offset `i % 64` (least significant
/// bit first), which is also the order the words are written out by the wire
/// codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BitArray {
    words: Vec<u64>,
    bit_width: u64,
}

impl BitArray {
    /// Allocate a zeroed bitmap able to address `bit_width` bits.
    ///
    /// Fails with [`Error::Configuration`](crate::Error::Configuration) if the
    /// words cannot be allocated.
    pub(crate) fn new(bit_width: u64) -> Result<Self> {
        Ok(Self {
            words: zeroed_words(word_count(bit_width))?,
            bit_width,
        })
    }

    /// A zeroed bitmap of the same width as `self`.
    pub(crate) fn cleared(&self) -> Self {
        Self {
            words: vec![0; self.words.len()],
            bit_width: self.bit_width,
        }
    }

    /// Wrap decoded `words` as a bitmap of `bit_width` bits.
    ///
    /// The caller must ensure `words` holds exactly `word_count(bit_width)`
    /// entries.
    pub(crate) fn from_words(bit_width: u64, words: Vec<u64>) -> Self {
        debug_assert_eq!(words.len() as u64, word_count(bit_width));
        Self { words, bit_width }
    }

    pub(crate) fn bit_width(&self) -> u64 {
        self.bit_width
    }

    pub(crate) fn words(&self) -> &[u64] {
        &self.words
    }

    /// Set the bit indexed by `key` to 1.
    #[inline]
    pub(crate) fn set(&mut self, key: u64) {
        debug_assert!(key < self.bit_width, "key {} >= {} bits", key, self.bit_width);
        self.words[index_for_key(key)] |= bitmask_for_key(key);
    }

    /// Return `true` if the bit indexed by `key` is set.
    #[inline]
    pub(crate) fn get(&self, key: u64) -> bool {
        self.words[index_for_key(key)] & bitmask_for_key(key) != 0
    }

    /// OR every word of `other` into `self`.
    pub(crate) fn or_assign(&mut self, other: &Self) {
        // Invariant: the word arrays are of equal length, meaning the zipped
        // iters yield both sides to completion.
        assert_eq!(self.words.len(), other.words.len());

        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= *b;
        }
    }

    /// Return a new bitmap containing the bitwise OR of `self` and `other`.
    pub(crate) fn or(&self, other: &Self) -> Self {
        assert_eq!(self.words.len(), other.words.len());

        let words = self
            .words
            .iter()
            .zip(&other.words)
            .map(|(a, b)| a | b)
            .collect();

        Self {
            words,
            bit_width: self.bit_width,
        }
    }
}
