use std::sync::Arc;

use thiserror::Error;

/// All errors that can occur while decoding segments or rendering a mosaic.
///
/// Errors are cheap to clone so that a single failed load can be handed to
/// every caller that was waiting on the same cache key.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Malformed FITS header block.
    #[error("invalid FITS header: {0}")]
    InvalidHeader(&'static str),
    /// Malformed keyword name in a header card.
    #[error("invalid keyword name")]
    InvalidKeyword,
    /// A required keyword was not found in the header.
    #[error("missing required keyword: {0}")]
    MissingKeyword(String),
    /// A keyword was present but its value had the wrong type.
    #[error("invalid value for keyword {0}")]
    InvalidValue(String),
    /// A DATASEC string did not match `[a:b,c:d]`.
    #[error("invalid datasec: {0}")]
    InvalidDatasec(String),
    /// A segment's geometry is inconsistent (datasec outside the readout,
    /// singular placement transform, ...).
    #[error("invalid segment geometry: {0}")]
    InvalidGeometry(String),
    /// Compressed tile data could not be inflated or had the wrong size.
    #[error("decompression failed: {0}")]
    Decompression(String),
    /// Compression scheme other than `GZIP_2`.
    #[error("unsupported compression type: {0}")]
    UnsupportedCompression(String),
    /// An I/O error from the standard library.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
    /// A worker task panicked or was cancelled.
    #[error("worker task failed: {0}")]
    TaskFailed(String),
}

/// Coarse classification of an [`Error`], for callers that react differently
/// to unreadable files and to malformed ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed header field, datasec, or compressed payload.
    Format,
    /// Compression scheme other than the supported one.
    UnsupportedFormat,
    /// File open failure or short read.
    Io,
    /// Internal failure of the worker pool.
    Internal,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Returns the category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidHeader(_)
            | Error::InvalidKeyword
            | Error::MissingKeyword(_)
            | Error::InvalidValue(_)
            | Error::InvalidDatasec(_)
            | Error::InvalidGeometry(_)
            | Error::Decompression(_) => ErrorKind::Format,
            Error::UnsupportedCompression(_) => ErrorKind::UnsupportedFormat,
            Error::Io(_) => ErrorKind::Io,
            Error::TaskFailed(_) => ErrorKind::Internal,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::TaskFailed(e.to_string())
    }
}
