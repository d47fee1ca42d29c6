//! Sizing calculations for choosing the bit width (`m`) and position count
//! (`k`) of a [`Filter`](crate::Filter).
//!
//! The false positive probability of a bloom filter grows with the number of
//! entries. Given the number of entries a filter is expected to hold and the
//! false positive probability that is acceptable at that load, the optimal
//! filter size is:
//!
//! ```text
//!     m = ceil(-n * ln(p) / ln(2)^2)
//!     k = ceil(m * ln(2) / n)
//! ```
//!
//! For example, holding 10,000 entries with a 1% false positive probability
//! needs a bit array of 95,851 bits (~12KB) tested at 7 positions per entry:
//!
//! ```rust
//! use keyed_bloom::sizing::{optimal_bit_width, optimal_position_count};
//!
//! let m = optimal_bit_width(10_000, 0.01);
//! assert_eq!(m, 95_851);
//! assert_eq!(optimal_position_count(m, 10_000), 7);
//! ```

use std::f64::consts::LN_2;

use crate::error::{Error, Result};

/// Returns the number of bits needed to hold `max_elements` entries with a
/// false positive probability of `p`.
///
/// The caller must ensure `0 < p < 1` and `max_elements > 0` - the formula
/// diverges at the boundaries, and out of range inputs produce meaningless
/// (though never panicking) results.
pub fn optimal_bit_width(max_elements: u64, p: f64) -> u64 {
    (-(max_elements as f64) * p.ln() / (LN_2 * LN_2)).ceil() as u64
}

/// Returns the optimal number of hash positions for a filter of `bit_width`
/// bits expected to hold `max_elements` entries.
///
/// Always returns at least 1.
pub fn optimal_position_count(bit_width: u64, max_elements: u64) -> u64 {
    let k = (bit_width as f64 * LN_2 / max_elements as f64).ceil() as u64;
    k.max(1)
}

/// Validates an accuracy target and returns the `(bit_width, position_count)`
/// pair that satisfies it.
pub(crate) fn optimal_shape(max_elements: u64, p: f64) -> Result<(u64, u64)> {
    if max_elements == 0 {
        return Err(Error::configuration(
            "maximum element count must be greater than 0",
        ));
    }

    // Written to also reject NaN.
    if !(p > 0.0 && p < 1.0) {
        return Err(Error::configuration(format!(
            "false positive probability must be within (0, 1) (was {p})"
        )));
    }

    let m = optimal_bit_width(max_elements, p);
    let k = optimal_position_count(m, max_elements);

    Ok((m, k))
}
