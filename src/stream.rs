//! Gzip compressed stream and file persistence for [`Filter`] instances.
//!
//! These wrap the [binary encoding](crate::codec) in a gzip stream. Files
//! written this way conventionally use the `.bf.gz` extension, though nothing
//! here enforces it.
//!
//! ```rust,no_run
//! use keyed_bloom::{stream, Filter};
//!
//! let filter = Filter::new_optimal(1_000_000, 0.001)?;
//! filter.add("bananas");
//! filter.write_file("seen.bf.gz")?;
//!
//! let (restored, _) = stream::read_file("seen.bf.gz")?;
//! assert!(restored.contains("bananas"));
//! # Ok::<(), keyed_bloom::Error>(())
//! ```

use std::fs::File;
use std::hash::BuildHasher;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use crate::error::Result;
use crate::Filter;

/// Decode a gzip compressed filter from `reader`.
///
/// Returns the filter and the number of uncompressed bytes decoded.
pub fn read_from<R: Read>(reader: R) -> Result<(Filter, u64)> {
    Filter::deserialize_from(GzDecoder::new(reader))
}

/// Decode a gzip compressed filter from the file at `path`.
///
/// Returns the filter and the number of uncompressed bytes decoded.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<(Filter, u64)> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let got = read_from(BufReader::new(file))?;

    debug!(path = %path.display(), bytes = got.1, "read bloom filter file");
    Ok(got)
}

impl<S> Filter<S>
where
    S: BuildHasher,
{
    /// Write the filter to `writer` as a gzip compressed stream, returning the
    /// number of uncompressed bytes written.
    ///
    /// The filter is read-locked while it is encoded, but not while the
    /// compressed output is written.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<u64> {
        let bytes = self.serialize();

        let mut enc = GzEncoder::new(writer, Compression::default());
        enc.write_all(&bytes)?;
        enc.finish()?.flush()?;

        Ok(bytes.len() as u64)
    }

    /// Create (or truncate) the file at `path` and write the filter to it as a
    /// gzip compressed stream.
    ///
    /// Returns the number of uncompressed bytes written.
    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<u64> {
        let path = path.as_ref();
        let file = File::create(path)?;

        let n = self.write_to(BufWriter::new(&file))?;
        file.sync_all()?;

        debug!(path = %path.display(), bytes = n, "wrote bloom filter file");
        Ok(n)
    }

    /// Replace the contents of `self` with a gzip compressed filter read from
    /// `reader`, returning the number of uncompressed bytes decoded.
    ///
    /// On error `self` is left unchanged.
    pub fn read_from<R: Read>(&self, reader: R) -> Result<u64> {
        self.replace_from(GzDecoder::new(reader))
    }

    /// Replace the contents of `self` with the gzip compressed filter in the
    /// file at `path`.
    pub fn read_file<P: AsRef<Path>>(&self, path: P) -> Result<u64> {
        let file = File::open(path)?;
        self.read_from(BufReader::new(file))
    }
}
