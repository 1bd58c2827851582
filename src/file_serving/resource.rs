use std::io::{self, Cursor, Read};
use std::sync::Arc;
use std::time::SystemTime;

use crate::compression::{determine_compression, CompressionType};
use crate::decoder::decompress;
use crate::error::{Error, Result};
use crate::http::content::{content_type, serve_content};
use crate::http::{Request, Response};
use crate::log_error;

/// A gzip asset held in both its stored and decompressed forms.
///
/// Both byte sequences are produced at construction and never change, so a
/// resource can be cloned cheaply and served from any number of threads.
#[derive(Debug, Clone)]
pub struct CompressedResource {
    name: String,
    compressed: Arc<[u8]>,
    decompressed: Arc<[u8]>,
    last_modified: SystemTime,
}

impl CompressedResource {
    /// Builds a resource from gzip bytes, decompressing them immediately.
    ///
    /// A non-zero `decompressed_size` must match the decompressed length
    /// exactly; `None` or zero lets the buffer grow as needed.
    pub fn from_bytes(
        name: impl Into<String>,
        compressed: impl Into<Arc<[u8]>>,
        decompressed_size: Option<usize>,
        last_modified: SystemTime,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::EmptyName);
        }

        let compressed = compressed.into();
        let decompressed = decompress(&compressed, decompressed_size)?;
        log::debug!(
            "Loaded {}: {} bytes compressed, {} bytes decompressed",
            name,
            compressed.len(),
            decompressed.len()
        );

        Ok(Self {
            name,
            compressed,
            decompressed: decompressed.into(),
            last_modified,
        })
    }

    /// Reads the gzip bytes from `reader` before handing over to
    /// [`from_bytes`](Self::from_bytes). A non-zero `compressed_size` reads
    /// exactly that many bytes; a reader that ends sooner is an error.
    pub fn from_reader<R: Read>(
        name: impl Into<String>,
        mut reader: R,
        compressed_size: Option<usize>,
        decompressed_size: Option<usize>,
        last_modified: SystemTime,
    ) -> Result<Self> {
        let name = name.into();
        let compressed = match compressed_size {
            Some(size) if size > 0 => {
                let mut buf = Vec::new();
                if buf.try_reserve_exact(size).is_err() {
                    log::debug!("Cannot reserve {} bytes for {}", size, name);
                }
                reader
                    .take(size as u64)
                    .read_to_end(&mut buf)
                    .map_err(|e| Error::io(name.as_str(), e))?;
                if buf.len() < size {
                    let e = io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("expected {} compressed bytes, got {}", size, buf.len()),
                    );
                    return Err(Error::io(name, e));
                }
                buf
            }
            _ => {
                let mut buf = Vec::new();
                reader
                    .read_to_end(&mut buf)
                    .map_err(|e| Error::io(name.as_str(), e))?;
                buf
            }
        };

        Self::from_bytes(name, compressed, decompressed_size, last_modified)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compressed(&self) -> &[u8] {
        &self.compressed
    }

    pub fn decompressed(&self) -> &[u8] {
        &self.decompressed
    }

    pub fn last_modified(&self) -> SystemTime {
        self.last_modified
    }

    /// Answers `request` with whichever representation its `Accept-Encoding`
    /// allows, or `406` when it allows neither or cannot be parsed.
    pub fn serve(&self, request: &Request) -> Response {
        let compression = match determine_compression(request.header("Accept-Encoding")) {
            Ok(Some(compression)) => compression,
            Ok(None) => {
                log::debug!("No acceptable encoding for {}", self.name);
                return Response::empty(406);
            }
            Err(e) => {
                log::debug!("Rejecting request for {}: {}", self.name, e);
                return Response::empty(406);
            }
        };

        // Both representations carry the type of the decompressed content.
        let mut response = Response::new(200);
        response.add_header("Vary", "Accept-Encoding");
        response.set_header("Content-Type", content_type(&self.name, &self.decompressed));

        let served = match compression {
            CompressionType::Gzip => {
                response.add_header("Content-Encoding", "gzip");
                let served = serve_content(
                    request,
                    &mut response,
                    &self.name,
                    self.last_modified,
                    Cursor::new(&self.compressed[..]),
                );
                if response.status() == 200 && response.header("Content-Length").is_none() {
                    response.set_header("Content-Length", self.compressed.len().to_string());
                }
                served
            }
            CompressionType::None => serve_content(
                request,
                &mut response,
                &self.name,
                self.last_modified,
                Cursor::new(&self.decompressed[..]),
            ),
        };

        match served {
            Ok(()) => response,
            Err(e) => {
                log_error!(e, format!("Failed to serve {}", self.name));
                Response::empty(500)
            }
        }
    }
}
