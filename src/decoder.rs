//! Gzip decoding for pre-compressed assets.
//!
//! Every function here runs at construction or build time. A failure means the
//! asset is corrupt or its size hint is wrong, and the caller is expected to
//! abort whatever it was building.

use flate2::read::MultiGzDecoder;
use std::io::{self, ErrorKind, Read};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Decompresses a complete gzip stream.
///
/// A non-zero `expected_size` must be matched exactly: a shorter stream is
/// [`Error::SizeMismatch`], a longer one is [`Error::Overlong`]. The hint is
/// reserved up front when the allocator can satisfy it. Without a hint the
/// output grows as needed.
pub fn decompress(compressed: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>> {
    let mut decoder = MultiGzDecoder::new(compressed);

    match expected_size {
        Some(expected) if expected > 0 => read_sized(&mut decoder, expected),
        _ => {
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).map_err(Error::Decode)?;
            Ok(out)
        }
    }
}

fn read_sized<R: Read>(decoder: R, expected: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    if out.try_reserve_exact(expected).is_err() {
        log::debug!("Cannot reserve {} bytes for a size hint", expected);
    }

    // One byte past the hint is enough to tell an overlong stream apart.
    // Stopping short of the limit means end of stream, so the trailer was checked.
    let limit = (expected as u64).saturating_add(1);
    decoder
        .take(limit)
        .read_to_end(&mut out)
        .map_err(Error::Decode)?;

    match out.len() {
        actual if actual < expected => Err(Error::SizeMismatch { expected, actual }),
        actual if actual > expected => Err(Error::Overlong { expected }),
        _ => Ok(out),
    }
}

/// A decoder owned by a single tree walk.
///
/// Each member is decoded straight from its reader into an output buffer
/// that is reused from one member to the next. Only the final, exactly sized
/// copy is handed out.
#[derive(Debug, Default)]
pub struct ScopedDecoder {
    scratch: Vec<u8>,
    members: usize,
}

impl ScopedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes one member from `reader`. `path` only labels errors.
    pub fn decompress_from<R: Read>(&mut self, path: &str, reader: R) -> Result<Arc<[u8]>> {
        self.scratch.clear();
        MultiGzDecoder::new(reader)
            .read_to_end(&mut self.scratch)
            .map_err(|e| stream_error(path, e))?;
        self.members += 1;

        Ok(Arc::from(&self.scratch[..]))
    }

    /// Number of members decoded so far.
    pub fn members(&self) -> usize {
        self.members
    }
}

// flate2 reports bad or truncated gzip data with these kinds; anything else
// came from the underlying reader.
fn stream_error(path: &str, e: io::Error) -> Error {
    match e.kind() {
        ErrorKind::InvalidInput | ErrorKind::InvalidData | ErrorKind::UnexpectedEof => {
            Error::Decode(e)
        }
        _ => Error::io(path, e),
    }
}
