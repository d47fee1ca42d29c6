//! Bit storage backing a [`Filter`](crate::Filter).

mod words;
pub(crate) use words::*;

use crate::error::{Error, Result};

/// Number of bits in each storage word.
pub(crate) const WORD_BITS: u64 = u64::BITS as u64;

/// Returns the number of words needed to hold `bit_width` bits.
#[inline(always)]
pub(crate) fn word_count(bit_width: u64) -> u64 {
    bit_width.div_ceil(WORD_BITS)
}

/// Allocate `len` zeroed words, returning [`Error::Configuration`] instead of
/// aborting when the allocation cannot be satisfied.
pub(crate) fn zeroed_words(len: u64) -> Result<Vec<u64>> {
    let too_large = || Error::configuration(format!("cannot allocate {len} 64-bit words"));

    let n = usize::try_from(len).map_err(|_| too_large())?;
    let mut words = Vec::new();
    words.try_reserve_exact(n).map_err(|_| too_large())?;
    words.resize(n, 0);

    Ok(words)
}

#[inline(always)]
pub(crate) fn bitmask_for_key(key: u64) -> u64 {
    1 << (key % WORD_BITS)
}

#[inline(always)]
pub(crate) fn index_for_key(key: u64) -> usize {
    (key / WORD_BITS) as usize
}
