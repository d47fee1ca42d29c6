//! Byte-exact binary encoding of a [`Filter`].
//!
//! All integers are little-endian `u64` values, with no padding:
//!
//! ```text
//!     ┌───────────┬───────────┬───────────┬──────────────┬────────────────────┬──────────┐
//!     │ k (8)     │ n (8)     │ m (8)     │ keys (8 * k) │ words (8 * ⌈m/64⌉) │ sha384   │
//!     └───────────┴───────────┴───────────┴──────────────┴────────────────────┴──────────┘
//!      position    element     bit width   position       bit array words      digest of
//!      key count   count                   keys, in order least significant    all bytes
//!                                                         bit first            before it
//! ```
//!
//! The trailing 48 byte SHA-384 digest is computed while the rest of the
//! payload is written, and recomputed while it is read back. A mismatch is
//! reported as [`Error::Integrity`].

use std::fmt;
use std::hash::BuildHasher;
use std::io::{self, Read};

use bytes::{BufMut, Bytes, BytesMut};
use sha2::{Digest, Sha384};
use tracing::{debug, trace};

use crate::bitmap::{word_count, BitArray};
use crate::builder::{has_duplicates, DefaultHashBuilder};
use crate::error::{Error, Result};
use crate::filter::{Filter, FilterState, MIN_BIT_WIDTH, MIN_POSITION_COUNT};

/// The length of the SHA-384 digest appended to every encoded filter.
pub const DIGEST_LEN: usize = 48;

const HEADER_LEN: usize = 3 * WORD_LEN;
const WORD_LEN: usize = std::mem::size_of::<u64>();

/// Upper bound on the number of words allocated ahead of reading them, so a
/// corrupt size field cannot trigger a huge allocation before the data backing
/// it has been seen.
const MAX_PREALLOC_WORDS: u64 = 1 << 16;

/// Appends `u64` values to a buffer, feeding every byte written into a running
/// SHA-384 digest.
struct HashingEncoder<'a> {
    buf: &'a mut BytesMut,
    hasher: Sha384,
}

impl<'a> HashingEncoder<'a> {
    fn new(buf: &'a mut BytesMut) -> Self {
        Self {
            buf,
            hasher: Sha384::new(),
        }
    }

    fn put_u64(&mut self, v: u64) {
        let bytes = v.to_le_bytes();
        self.hasher.update(bytes);
        self.buf.put_slice(&bytes);
    }

    /// Append the digest of everything written so far.
    fn finish(self) {
        let digest = self.hasher.finalize();
        self.buf.put_slice(&digest);
    }
}

/// Wraps a reader, feeding every byte read into a running SHA-384 digest and
/// counting the bytes consumed.
struct HashingReader<R> {
    inner: R,
    hasher: Sha384,
    bytes_read: u64,
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes_read += n as u64;
        Ok(n)
    }
}

/// Lowercase hex rendering of a digest for diagnostics.
struct Hex<'a>(&'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|b| write!(f, "{b:02x}"))
    }
}

/// Returns the encoded size of a filter with the given shape.
fn encoded_len(keys: usize, words: usize) -> usize {
    HEADER_LEN + (keys + words) * WORD_LEN + DIGEST_LEN
}

pub(crate) fn encode(state: &FilterState) -> Bytes {
    let words = state.bits.words();
    let mut buf = BytesMut::with_capacity(encoded_len(state.keys.len(), words.len()));

    let mut enc = HashingEncoder::new(&mut buf);
    enc.put_u64(state.keys.len() as u64);
    enc.put_u64(state.count);
    enc.put_u64(state.bit_width());
    state.keys.iter().for_each(|&key| enc.put_u64(key));
    words.iter().for_each(|&word| enc.put_u64(word));
    enc.finish();

    buf.freeze()
}

fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0; WORD_LEN];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_words<R: Read>(r: &mut R, count: u64) -> io::Result<Vec<u64>> {
    let mut out = Vec::with_capacity(count.min(MAX_PREALLOC_WORDS) as usize);
    for _ in 0..count {
        out.push(read_u64(r)?);
    }
    Ok(out)
}

/// Decode a filter from `reader`, returning it along with the number of bytes
/// consumed.
///
/// Reading stops immediately after the digest - any trailing data is left
/// unread.
pub(crate) fn decode<R: Read>(reader: R) -> Result<(FilterState, u64)> {
    let mut r = HashingReader {
        inner: reader,
        hasher: Sha384::new(),
        bytes_read: 0,
    };

    // Validate the size fields as soon as each is read, before anything is
    // allocated for them.
    let k = read_u64(&mut r)?;
    if k < MIN_POSITION_COUNT {
        return Err(Error::Format {
            reason: "k too small",
        });
    }

    let n = read_u64(&mut r)?;
    let m = read_u64(&mut r)?;
    if m < MIN_BIT_WIDTH {
        return Err(Error::Format {
            reason: "m too small",
        });
    }

    trace!(k, n, m, "read bloom filter header");

    let keys = read_words(&mut r, k)?;
    let words = read_words(&mut r, word_count(m))?;

    // Only the digest remains, which is not itself part of the digest.
    let HashingReader {
        mut inner,
        hasher,
        bytes_read,
    } = r;
    let computed = hasher.finalize();

    let mut stored = [0; DIGEST_LEN];
    inner.read_exact(&mut stored)?;
    let bytes_read = bytes_read + DIGEST_LEN as u64;

    if computed.as_slice() != stored.as_slice() {
        debug!(
            computed = %Hex(computed.as_slice()),
            stored = %Hex(&stored),
            "bloom filter digest mismatch"
        );
        return Err(Error::Integrity { bytes_read });
    }

    if has_duplicates(&keys) {
        return Err(Error::Format {
            reason: "duplicate position keys",
        });
    }

    let state = FilterState {
        bits: BitArray::from_words(m, words),
        keys: keys.into_boxed_slice(),
        count: n,
    };

    Ok((state, bytes_read))
}

impl Filter {
    /// Decode a filter previously encoded with [`serialize`](Filter::serialize).
    ///
    /// ```rust
    /// use keyed_bloom::Filter;
    ///
    /// let filter = Filter::with_keys(1024, &[1, 2, 3])?;
    /// filter.add("test");
    ///
    /// let bytes = filter.serialize();
    /// let restored = Filter::deserialize(&bytes)?;
    ///
    /// assert!(restored.contains("test"));
    /// assert_eq!(restored.words(), filter.words());
    /// # Ok::<(), keyed_bloom::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] if the header declares fewer than
    /// [`MIN_POSITION_COUNT`] keys or fewer than [`MIN_BIT_WIDTH`] bits,
    /// [`Error::Io`] if `data` is truncated, and [`Error::Integrity`] if the
    /// trailing digest does not match the decoded content.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        Self::deserialize_with_hasher(data, DefaultHashBuilder::default())
    }

    /// Decode a filter from `reader`, returning it together with the number of
    /// bytes consumed.
    pub fn deserialize_from<R: Read>(reader: R) -> Result<(Self, u64)> {
        Self::deserialize_from_with_hasher(reader, DefaultHashBuilder::default())
    }
}

impl<S> Filter<S>
where
    S: BuildHasher,
{
    /// Encode the filter in the binary wire format.
    ///
    /// The filter is read-locked for the duration of the encoding.
    pub fn serialize(&self) -> Bytes {
        encode(&self.state.read())
    }

    /// The length of the output of [`serialize`](Filter::serialize).
    pub fn serialized_len(&self) -> usize {
        let state = self.state.read();
        encoded_len(state.keys.len(), state.bits.words().len())
    }

    /// As [`Filter::deserialize`], using `hasher` to hash values passed to
    /// [`add`](Filter::add) and [`contains`](Filter::contains).
    pub fn deserialize_with_hasher(data: &[u8], hasher: S) -> Result<Self> {
        Self::deserialize_from_with_hasher(data, hasher).map(|(f, _)| f)
    }

    /// As [`Filter::deserialize_from`], using `hasher` to hash values passed
    /// to [`add`](Filter::add) and [`contains`](Filter::contains).
    pub fn deserialize_from_with_hasher<R: Read>(reader: R, hasher: S) -> Result<(Self, u64)> {
        let (state, n) = decode(reader)?;
        Ok((Self::from_state(state, hasher), n))
    }

    /// Replace the entire contents of `self` (bit width, keys, bits and element
    /// count) with a filter decoded from `reader`, returning the number of bytes
    /// consumed.
    ///
    /// The input is fully decoded and verified before `self` is locked. On
    /// error `self` is left unchanged.
    pub fn replace_from<R: Read>(&self, reader: R) -> Result<u64> {
        let (state, n) = decode(reader)?;
        *self.state.write() = state;
        Ok(n)
    }
}
