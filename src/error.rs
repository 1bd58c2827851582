use std::io;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while constructing resources, building a virtual
/// filesystem, or looking entries up in one.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed gzip stream: {0}")]
    Decode(#[source] io::Error),

    #[error("decompressed size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("decompressed stream is longer than the expected {expected} bytes")]
    Overlong { expected: usize },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("resource name must not be empty")]
    EmptyName,

    #[error("invalid Accept-Encoding header: {0}")]
    Negotiation(String),
}

impl Error {
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::NotFound(_) => io::ErrorKind::NotFound,
            Error::Io { source, .. } => source.kind(),
            Error::Negotiation(_) => io::ErrorKind::InvalidInput,
            _ => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, err)
    }
}
