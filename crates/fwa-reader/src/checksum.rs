//! Payload checksum verification.
//!
//! Every digest in an artifact is SHA-256. Digests are computed
//! incrementally while bytes stream through the reader, so a payload file is
//! never buffered just to be hashed.
//!
//! # Security
//!
//! - Declared and computed digests are compared in constant time
//! - A mismatch is always fatal to the read

use std::fmt;
use std::io::{self, Read};

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::ReadError;

/// Length of a SHA-256 digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// A SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha256Digest([u8; DIGEST_LEN]);

impl Sha256Digest {
    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a hex encoded digest.
    ///
    /// Returns `None` unless the input is exactly 64 hex characters.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let bytes: [u8; DIGEST_LEN] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Digest of an in-memory buffer.
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Constant-time equality.
    pub fn ct_matches(&self, other: &Sha256Digest) -> bool {
        self.0.ct_eq(&other.0).unwrap_u8() == 1
    }
}

impl fmt::Debug for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256Digest({})", self.to_hex())
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Incremental checksum for one named file.
///
/// Feed it with [`update`](Self::update) as bytes arrive, then either take
/// the digest with [`finalize`](Self::finalize) or compare it against the
/// declared value with [`verify`](Self::verify).
pub struct ChecksumVerifier {
    name: String,
    hasher: Sha256,
    bytes_hashed: u64,
}

impl ChecksumVerifier {
    /// Start a checksum for the file called `name`.
    ///
    /// The name only appears in errors and log events.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hasher: Sha256::new(),
            bytes_hashed: 0,
        }
    }

    /// Name of the file being hashed.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of bytes hashed so far.
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes_hashed
    }

    /// Hash another chunk of content.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.bytes_hashed += chunk.len() as u64;
    }

    /// Finish hashing and return the digest.
    pub fn finalize(self) -> Sha256Digest {
        Sha256Digest(self.hasher.finalize().into())
    }

    /// Finish hashing and compare with the declared digest.
    ///
    /// # Errors
    ///
    /// Returns `ReadError::ChecksumMismatch` naming this file when the
    /// digests differ.
    pub fn verify(self, expected: &Sha256Digest) -> Result<Sha256Digest, ReadError> {
        let name = self.name.clone();
        let size = self.bytes_hashed;
        let actual = self.finalize();

        if !actual.ct_matches(expected) {
            tracing::error!(
                file = %name,
                expected = %expected,
                actual = %actual,
                "Checksum mismatch"
            );
            return Err(ReadError::ChecksumMismatch {
                file: name,
                expected: expected.to_hex(),
                actual: actual.to_hex(),
            });
        }

        tracing::debug!(file = %name, size, checksum = %actual, "Checksum verified");
        Ok(actual)
    }
}

/// Reader adapter that hashes every byte passing through it.
pub struct HashingReader<R> {
    inner: R,
    checksum: ChecksumVerifier,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R, name: impl Into<String>) -> Self {
        Self {
            inner,
            checksum: ChecksumVerifier::new(name),
        }
    }

    /// Number of bytes read through this adapter so far.
    pub fn bytes_hashed(&self) -> u64 {
        self.checksum.bytes_hashed()
    }

    /// Consume whatever is left in the inner reader so the digest covers
    /// the whole stream. Returns the number of bytes drained.
    pub fn drain(&mut self) -> io::Result<u64> {
        io::copy(self, &mut io::sink())
    }

    /// Drain the rest of the stream and return its digest.
    pub fn finish(mut self) -> io::Result<Sha256Digest> {
        self.drain()?;
        Ok(self.checksum.finalize())
    }

    /// Drain the rest of the stream and compare with the declared digest.
    pub fn finish_and_verify(mut self, expected: &Sha256Digest) -> Result<Sha256Digest, ReadError> {
        self.drain()?;
        self.checksum.verify(expected)
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.checksum.update(&buf[..n]);
        Ok(n)
    }
}
