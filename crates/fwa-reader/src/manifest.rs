//! Checksum manifest parsing.
//!
//! The `manifest` entry pins the SHA-256 digest of every other part of the
//! container, one line per file:
//!
//! ```text
//! 96bcd965947569404798bcbdb614f103db5a004eb6e364cfc162c146890ea35b  version
//! 5b5a2a9dbd6b9e4bf47e3c3b0a8a6aaaf0af2d3f8a13cbfa4c5ebd5c8f2a0b4b  header.tar.gz
//! 9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08  data/0000/rootfs.img
//! ```
//!
//! The raw bytes are kept alongside the parsed table because they are the
//! message the detached signature covers.

use std::collections::BTreeMap;

use crate::checksum::Sha256Digest;
use crate::error::ReadError;

/// Entry name of the manifest inside the outer archive.
pub const MANIFEST_ENTRY: &str = "manifest";

/// Parsed checksum manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumManifest {
    raw: Vec<u8>,
    entries: BTreeMap<String, Sha256Digest>,
}

impl ChecksumManifest {
    /// Parse manifest bytes.
    ///
    /// # Errors
    ///
    /// Returns `ReadError::MalformedContainer` if the text is not UTF-8, a
    /// line does not have exactly a digest and a path, a digest is not 64
    /// hex characters, or a path is listed twice.
    pub fn parse(raw: Vec<u8>) -> Result<Self, ReadError> {
        let text = std::str::from_utf8(&raw)
            .map_err(|e| ReadError::malformed(MANIFEST_ENTRY, format!("not valid UTF-8: {e}")))?;

        let mut entries = BTreeMap::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let mut fields = line.split_whitespace();
            let (Some(digest), Some(path), None) = (fields.next(), fields.next(), fields.next()) else {
                return Err(ReadError::malformed(
                    MANIFEST_ENTRY,
                    format!("line {}: expected '<sha256>  <path>'", number + 1),
                ));
            };

            let digest = Sha256Digest::from_hex(digest).ok_or_else(|| {
                ReadError::malformed(
                    MANIFEST_ENTRY,
                    format!("line {}: invalid SHA-256 digest for {path}", number + 1),
                )
            })?;

            if entries.insert(path.to_string(), digest).is_some() {
                return Err(ReadError::malformed(
                    MANIFEST_ENTRY,
                    format!("duplicate entry for {path}"),
                ));
            }
        }

        tracing::debug!(entries = entries.len(), "Parsed checksum manifest");
        Ok(Self { raw, entries })
    }

    /// Declared digest for `path`, if the manifest lists it.
    pub fn get(&self, path: &str) -> Option<&Sha256Digest> {
        self.entries.get(path)
    }

    /// Declared digest for `path`, or a malformed-container error naming it.
    pub fn require(&self, path: &str) -> Result<&Sha256Digest, ReadError> {
        self.get(path).ok_or_else(|| {
            ReadError::malformed(MANIFEST_ENTRY, format!("no checksum listed for {path}"))
        })
    }

    /// The exact bytes a detached signature covers.
    pub fn canonical_message(&self) -> &[u8] {
        &self.raw
    }

    /// Paths listed for the payload at `index`, in sorted order.
    pub fn data_files(&self, index: usize) -> impl Iterator<Item = &str> {
        let prefix = format!("{}/", data_dir(index));
        self.entries
            .keys()
            .filter(move |path| path.starts_with(&prefix))
            .map(String::as_str)
    }

    /// Every listed path, in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Manifest directory of the payload at `index`, e.g. `data/0003`.
pub fn data_dir(index: usize) -> String {
    format!("data/{index:04}")
}

/// Manifest path of payload file `name` at `index`, e.g. `data/0000/rootfs.img`.
pub fn data_path(index: usize, name: &str) -> String {
    format!("{}/{name}", data_dir(index))
}
