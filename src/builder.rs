use std::hash::{BuildHasher, BuildHasherDefault};

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use tracing::debug;
use twox_hash::XxHash64;

use crate::bitmap::zeroed_words;
use crate::error::{Error, Result};
use crate::filter::{Filter, FilterState, MIN_BIT_WIDTH, MIN_POSITION_COUNT};
use crate::sizing::optimal_shape;

/// The default hash algorithm used to hash values passed to
/// [`Filter::add`](crate::Filter::add): xxHash64 with a zero seed.
///
/// Unlike [`RandomState`](std::collections::hash_map::RandomState) this
/// produces the same hash in every process, which is required for a filter to
/// remain useful after being serialised and loaded elsewhere.
pub type DefaultHashBuilder = BuildHasherDefault<XxHash64>;

#[derive(Debug, Clone)]
enum Shape {
    Size { bit_width: u64, position_count: u64 },
    Keys { bit_width: u64, keys: Vec<u64> },
    Accuracy { max_elements: u64, p: f64 },
}

/// Construct [`Filter`] instances with varying parameters.
///
/// ```rust
/// use keyed_bloom::FilterBuilder;
/// use rand::{rngs::StdRng, SeedableRng};
///
/// // Reproducible position keys from a seeded CSPRNG.
/// let mut rng = StdRng::seed_from_u64(42);
///
/// let filter = FilterBuilder::with_accuracy(10_000, 0.001)
///     .build_with_rng(&mut rng)?;
///
/// filter.add("success!");
/// assert!(filter.contains("success!"));
/// # Ok::<(), keyed_bloom::Error>(())
/// ```
///
/// All parameters are validated by [`build`](FilterBuilder::build).
#[derive(Debug, Clone)]
pub struct FilterBuilder<S = DefaultHashBuilder> {
    shape: Shape,
    hasher: S,
}

impl FilterBuilder {
    /// A filter of `bit_width` bits addressed by `position_count` randomly
    /// generated position keys.
    pub fn with_size(bit_width: u64, position_count: u64) -> Self {
        Self {
            shape: Shape::Size {
                bit_width,
                position_count,
            },
            hasher: DefaultHashBuilder::default(),
        }
    }

    /// A filter of `bit_width` bits addressed by the given position `keys`.
    pub fn with_keys(bit_width: u64, keys: &[u64]) -> Self {
        Self {
            shape: Shape::Keys {
                bit_width,
                keys: keys.to_vec(),
            },
            hasher: DefaultHashBuilder::default(),
        }
    }

    /// A filter sized for `max_elements` entries at a false positive
    /// probability of `p`, with randomly generated position keys.
    ///
    /// See [`sizing`](crate::sizing).
    pub fn with_accuracy(max_elements: u64, p: f64) -> Self {
        Self {
            shape: Shape::Accuracy { max_elements, p },
            hasher: DefaultHashBuilder::default(),
        }
    }
}

impl<S> FilterBuilder<S>
where
    S: BuildHasher,
{
    /// Set the hash algorithm used to hash values passed to
    /// [`Filter::add`] and [`Filter::contains`].
    ///
    /// Filters that are merged, or serialised and reloaded, must use the same
    /// algorithm to produce meaningful results.
    pub fn hasher<H: BuildHasher>(self, hasher: H) -> FilterBuilder<H> {
        FilterBuilder {
            shape: self.shape,
            hasher,
        }
    }

    /// Initialise the [`Filter`], drawing any random position keys from the
    /// operating system CSPRNG.
    pub fn build(self) -> Result<Filter<S>> {
        self.build_with_rng(&mut OsRng)
    }

    /// Initialise the [`Filter`], drawing any random position keys from `rng`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the requested shape is invalid, and
    /// [`Error::RandomnessFault`] if `rng` fails to produce keys.
    pub fn build_with_rng<R>(self, rng: &mut R) -> Result<Filter<S>>
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        let (bit_width, keys) = match self.shape {
            Shape::Keys { bit_width, keys } => (bit_width, keys),
            Shape::Size {
                bit_width,
                position_count,
            } => {
                check_shape(bit_width, position_count)?;
                (bit_width, random_keys(rng, position_count)?)
            }
            Shape::Accuracy { max_elements, p } => {
                let (bit_width, position_count) = optimal_shape(max_elements, p)?;
                check_shape(bit_width, position_count)?;
                (bit_width, random_keys(rng, position_count)?)
            }
        };

        check_shape(bit_width, keys.len() as u64)?;
        if has_duplicates(&keys) {
            return Err(Error::configuration("position keys must be unique"));
        }

        debug!(
            bit_width,
            position_count = keys.len(),
            "initialised bloom filter"
        );

        let state = FilterState::new(bit_width, keys.into_boxed_slice())?;
        Ok(Filter::from_state(state, self.hasher))
    }
}

fn check_shape(bit_width: u64, position_count: u64) -> Result<()> {
    if bit_width < MIN_BIT_WIDTH {
        return Err(Error::configuration(format!(
            "number of bits in the filter must be >= {MIN_BIT_WIDTH} (was {bit_width})"
        )));
    }
    if position_count < MIN_POSITION_COUNT {
        return Err(Error::configuration(format!(
            "position keys must have length {MIN_POSITION_COUNT} or greater (was {position_count})"
        )));
    }
    Ok(())
}

fn random_keys<R>(rng: &mut R, count: u64) -> Result<Vec<u64>>
where
    R: RngCore + CryptoRng + ?Sized,
{
    let mut keys = zeroed_words(count)?;
    for key in keys.iter_mut() {
        let mut buf = [0; 8];
        rng.try_fill_bytes(&mut buf).map_err(Error::RandomnessFault)?;
        *key = u64::from_le_bytes(buf);
    }
    Ok(keys)
}

pub(crate) fn has_duplicates(keys: &[u64]) -> bool {
    let mut sorted = keys.to_vec();
    sorted.sort_unstable();
    sorted.windows(2).any(|w| w[0] == w[1])
}
