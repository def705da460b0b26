//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

use crate::format::ArchiveFormat;

/// Message prefix shared by every format reject
pub const INVALID_ARCHIVE: &str = "Archive is invalid and/or corrupt";

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent wrapper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// Transparent wrapper for [`serde_json::Error`]
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    /// The data is not a valid archive of the requested format
    #[error("Archive is invalid and/or corrupt: {0}")]
    #[diagnostic(help("this file could not be opened as an archive"))]
    InvalidArchive(String),

    /// The format handler does not implement the requested operation
    #[error("{format} archives do not support {operation}")]
    UnsupportedOperation {
        /// Format of the archive
        format: ArchiveFormat,
        /// The operation that was attempted
        operation: &'static str,
    },

    /// No handler recognised the data
    #[error("unable to determine archive format")]
    UnknownFormat,

    /// another entry named {0} already exists
    #[error("another entry named {0} already exists")]
    DuplicateName(String),

    /// {0} is not a valid name here
    #[error("{0} is not a valid name here")]
    InvalidName(String),

    /// index {0} is out of range
    #[error("index {0} is out of range")]
    IndexOutOfRange(usize),

    /// unable to find requested entry
    #[error("unable to find requested entry")]
    NotFound(#[from] NotFoundError),

    /// The archive has more entries than the format can index
    #[error("archive has {count} entries, the format allows at most {max}")]
    TooManyEntries {
        /// Number of entries that were to be written
        count: usize,
        /// Format limit
        max: usize,
    },

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

impl Error {
    /// Shorthand for a format reject with a detail message
    pub fn invalid(detail: impl Into<String>) -> Self {
        Error::InvalidArchive(detail.into())
    }
}

/// Error type to provide further information when an entry has not been found
#[derive(Error, Diagnostic, Debug)]
pub enum NotFoundError {
    /// at index {0}
    #[error("at index {0}")]
    Index(usize),

    /// by name {0}
    #[error("by name {0}")]
    Name(String),

    /// at path {0}
    #[error("at path {0}")]
    Path(String),

    /// entry is not part of this archive
    #[error("entry is not part of this archive")]
    Detached,
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
