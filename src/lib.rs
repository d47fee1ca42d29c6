//! keyed-bloom implements a thread-safe bloom filter whose bit positions are
//! derived from a single 64-bit hash XORed with a set of random position keys.
//!
//! Each value is hashed exactly once. The hash is combined with each of the
//! filter's `k` position keys to select `k` bits in an `m` bit array:
//!
//! ```text
//!     position_i = (hash ^ key_i) mod m
//! ```
//!
//! Keys are drawn independently at random by default, so the `k` positions
//! behave like the outputs of `k` independent hash functions. They are not a
//! secret, and provide no protection against callers choosing values to
//! collide. Filters that share a bit width and position keys are compatible,
//! and can be merged with [`Filter::union`].
//!
//! ```rust
//! use keyed_bloom::Filter;
//!
//! // Sized for 10,000 entries with a 1% false positive probability.
//! let filter = Filter::new_optimal(10_000, 0.01)?;
//!
//! filter.add("bananas");
//! assert!(filter.contains("bananas"));
//!
//! // Filters are shared between threads by reference.
//! std::thread::scope(|s| {
//!     s.spawn(|| filter.add("apples"));
//! });
//! assert!(filter.contains("apples"));
//! # Ok::<(), keyed_bloom::Error>(())
//! ```
//!
//! Filters can be persisted with a [binary encoding](codec) protected by a
//! SHA-384 digest, optionally gzip compressed with the [`stream`] helpers.
//!
//! ## Features
//!
//! * `serde` - enable a versioned JSON encoding with [serde], disabled by
//!   default
//!
//! [serde]: https://github.com/serde-rs/serde

mod bitmap;
mod builder;
pub mod codec;
mod error;
mod filter;
#[cfg(feature = "serde")]
mod json;
pub mod sizing;
pub mod stream;

pub use builder::*;
pub use codec::DIGEST_LEN;
pub use error::*;
pub use filter::*;
#[cfg(feature = "serde")]
pub use json::JSON_VERSION;
