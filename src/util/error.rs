//! Error types for the crate file library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for crate file operations.
#[derive(Error, Debug)]
pub enum Error {
    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Bootstrap identifier is not `PXR-USDC`
    #[error("Invalid crate file: bootstrap magic mismatch")]
    InvalidMagic,

    /// File was written by a newer (or different major) version
    #[error("Unsupported crate version: file is {file}, software supports {software}")]
    UnsupportedVersion { file: String, software: String },

    /// File is truncated or corrupted
    #[error("Unexpected end of file at position {0}")]
    UnexpectedEof(u64),

    /// Invalid data structure in file
    #[error("Invalid file structure: {0}")]
    InvalidStructure(String),

    /// Compressed block or array discriminator could not be decoded
    #[error("Corrupt data stream: {0}")]
    CorruptData(String),

    /// Type mismatch when reading data
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Value rep carries a type tag we cannot decode
    #[error("Unsupported value type tag {0}")]
    UnsupportedType(u8),

    /// Malformed path string or path element
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// No spec at the given path
    #[error("Spec not found: {0}")]
    SpecNotFound(String),

    /// A spec already exists at the given path
    #[error("Spec already exists: {0}")]
    SpecExists(String),

    /// Packing was requested on a file that cannot be updated in place
    #[error("Cannot pack to {0}: not the file this store was read from")]
    PackingTarget(String),

    /// Write operation failed
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Memory mapping failed
    #[error("Memory mapping failed: {0}")]
    MmapFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 conversion error
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an invalid structure error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    /// Create a corrupt data error.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptData(msg.into())
    }

    /// Create a type mismatch error.
    pub fn mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Result type alias for crate file operations.
pub type Result<T> = std::result::Result<T, Error>;
