use thiserror::Error;

/// Convenience alias for results returned by this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned when constructing, merging or decoding a
/// [`Filter`](crate::Filter).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The parameters given to construct a filter are invalid.
    #[error("invalid filter configuration: {0}")]
    Configuration(String),

    /// Two filters do not share the same bit width and position keys, and
    /// cannot be merged.
    #[error("incompatible bloom filters: {0}")]
    Incompatible(&'static str),

    /// A serialised filter header contains an out of range size field.
    #[error("malformed filter encoding: {reason}")]
    Format {
        /// A short description of the rejected field.
        reason: &'static str,
    },

    /// The digest appended to a serialised filter does not match its
    /// contents.
    #[error("filter digest mismatch after reading {bytes_read} bytes")]
    Integrity {
        /// The number of bytes consumed before the mismatch was detected,
        /// including the stored digest.
        bytes_read: u64,
    },

    /// The randomness source failed to produce position keys.
    #[error("failed to read position keys from randomness source: {0}")]
    RandomnessFault(#[source] rand::Error),

    /// The JSON encoding was produced by a different encoder version.
    #[cfg(feature = "serde")]
    #[error("incompatible encoding version: expected {expected}, found {found}")]
    VersionMismatch {
        /// The version this crate writes.
        expected: &'static str,
        /// The version found in the input.
        found: String,
    },

    /// The JSON encoding could not be parsed or produced.
    #[cfg(feature = "serde")]
    #[error("json encoding: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing the underlying byte stream failed, including
    /// truncated input.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
