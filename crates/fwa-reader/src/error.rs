//! Error types for artifact reading.
//!
//! Two policies live side by side here. [`ReadError`] is fatal: the read
//! stops and no artifact is returned. [`SectionError`] is recoverable: it is
//! stored on the affected update and the read carries on.

use std::fmt;
use std::io;

use serde::Serialize;
use thiserror::Error;

/// Fatal errors that abort an artifact read.
#[derive(Debug, Error)]
pub enum ReadError {
    /// Container format or version is not supported
    #[error("unsupported artifact version: format {format:?}, version {version}")]
    UnsupportedVersion { format: String, version: u64 },

    /// Section ordering or structure violated
    #[error("malformed container at {section}: {reason}")]
    MalformedContainer { section: String, reason: String },

    /// No handler registered for a declared update type
    #[error("unsupported update type: {0}")]
    UnsupportedUpdateType(String),

    /// Streamed content does not match the digest declared in the manifest
    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    /// IO error on the underlying stream
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl ReadError {
    pub(crate) fn malformed(section: impl Into<String>, reason: impl Into<String>) -> Self {
        ReadError::MalformedContainer {
            section: section.into(),
            reason: reason.into(),
        }
    }

    /// Map an error raised while decoding a container stream.
    ///
    /// The tar and gzip decoders report corrupt input as `InvalidData` or
    /// `UnexpectedEof`; those are structural problems with the container,
    /// not failures of the byte source.
    pub(crate) fn from_stream(section: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::InvalidData
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::Other => ReadError::malformed(section, err.to_string()),
            _ => ReadError::IoError(err),
        }
    }

    /// The kind of this error, without its payload.
    pub fn kind(&self) -> ReadErrorKind {
        match self {
            ReadError::UnsupportedVersion { .. } => ReadErrorKind::UnsupportedVersion,
            ReadError::MalformedContainer { .. } => ReadErrorKind::MalformedContainer,
            ReadError::UnsupportedUpdateType(_) => ReadErrorKind::UnsupportedUpdateType,
            ReadError::ChecksumMismatch { .. } => ReadErrorKind::ChecksumMismatch,
            ReadError::IoError(_) => ReadErrorKind::Io,
        }
    }
}

/// Payload-free discriminant of [`ReadError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadErrorKind {
    UnsupportedVersion,
    MalformedContainer,
    UnsupportedUpdateType,
    ChecksumMismatch,
    Io,
}

/// Which per-update section failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Provides,
    Depends,
    MetaData,
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionKind::Provides => write!(f, "provides"),
            SectionKind::Depends => write!(f, "depends"),
            SectionKind::MetaData => write!(f, "metadata"),
        }
    }
}

/// A provides, depends or metadata section that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("invalid {section} section: {reason}")]
pub struct SectionError {
    pub section: SectionKind,
    pub reason: String,
}

impl SectionError {
    pub fn new(section: SectionKind, reason: impl Into<String>) -> Self {
        Self {
            section,
            reason: reason.into(),
        }
    }
}

/// Errors raised while building a reader from configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a config or key file
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to parse a config file
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Verification key is malformed
    #[error("invalid verification key: {0}")]
    InvalidKey(String),

    /// A second handler was registered for the same update type
    #[error("handler already registered for update type {0}")]
    DuplicateHandler(String),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    ValidationError(String),
}
