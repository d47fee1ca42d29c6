//! A versioned JSON encoding of a [`Filter`], enabled by the `serde` feature.
//!
//! The encoding carries the same fields as the [binary format](crate::codec)
//! without the digest, tagged with [`JSON_VERSION`]:
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "bits": [12094627905536],
//!   "keys": [1, 2, 3],
//!   "m": 64,
//!   "n": 1
//! }
//! ```
//!
//! Decoding input tagged with any other version fails. The two formats are
//! independent - JSON cannot be converted to the binary format without
//! decoding it first.

use std::hash::BuildHasher;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::bitmap::{word_count, BitArray};
use crate::builder::{has_duplicates, DefaultHashBuilder};
use crate::error::{Error, Result};
use crate::filter::{Filter, FilterState, MIN_BIT_WIDTH, MIN_POSITION_COUNT};

/// The version tag written to, and required from, the JSON encoding.
pub const JSON_VERSION: &str = "1.0";

#[derive(Serialize)]
struct EncodedRef<'a> {
    version: &'a str,
    bits: &'a [u64],
    keys: &'a [u64],
    m: u64,
    n: u64,
}

#[derive(Deserialize)]
struct Encoded {
    version: String,
    bits: Vec<u64>,
    keys: Vec<u64>,
    m: u64,
    n: u64,
}

impl TryFrom<Encoded> for FilterState {
    type Error = Error;

    fn try_from(v: Encoded) -> Result<Self> {
        if v.version != JSON_VERSION {
            return Err(Error::VersionMismatch {
                expected: JSON_VERSION,
                found: v.version,
            });
        }
        if (v.keys.len() as u64) < MIN_POSITION_COUNT {
            return Err(Error::Format {
                reason: "k too small",
            });
        }
        if v.m < MIN_BIT_WIDTH {
            return Err(Error::Format {
                reason: "m too small",
            });
        }
        if v.bits.len() as u64 != word_count(v.m) {
            return Err(Error::Format {
                reason: "bit array length does not match m",
            });
        }
        if has_duplicates(&v.keys) {
            return Err(Error::Format {
                reason: "duplicate position keys",
            });
        }

        Ok(FilterState {
            bits: BitArray::from_words(v.m, v.bits),
            keys: v.keys.into_boxed_slice(),
            count: v.n,
        })
    }
}

/// Serialises the filter fields under a read lock.
impl<S> Serialize for Filter<S> {
    fn serialize<T>(&self, serializer: T) -> std::result::Result<T::Ok, T::Error>
    where
        T: Serializer,
    {
        let state = self.state.read();
        EncodedRef {
            version: JSON_VERSION,
            bits: state.bits.words(),
            keys: &state.keys,
            m: state.bit_width(),
            n: state.count,
        }
        .serialize(serializer)
    }
}

impl<'de, S> Deserialize<'de> for Filter<S>
where
    S: BuildHasher + Default,
{
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let state = FilterState::try_from(Encoded::deserialize(deserializer)?)
            .map_err(D::Error::custom)?;
        Ok(Filter::from_state(state, S::default()))
    }
}

impl Filter {
    /// Decode a filter from its JSON encoding.
    ///
    /// ```rust
    /// use keyed_bloom::Filter;
    ///
    /// let filter = Filter::with_keys(64, &[1, 2, 3])?;
    /// filter.add_hash(42);
    ///
    /// let json = filter.to_json()?;
    /// let restored = Filter::from_json(&json)?;
    /// assert!(restored.contains_hash(42));
    /// # Ok::<(), keyed_bloom::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::VersionMismatch`] if the input was not produced by this
    /// version of the encoder, [`Error::Format`] if the fields describe an
    /// invalid filter, and [`Error::Json`] for malformed input.
    pub fn from_json(json: &str) -> Result<Self> {
        let state = FilterState::try_from(serde_json::from_str::<Encoded>(json)?)?;
        Ok(Filter::from_state(state, DefaultHashBuilder::default()))
    }
}

impl<S> Filter<S>
where
    S: BuildHasher,
{
    /// Encode the filter as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
