//! # fwa-reader
//!
//! Reader and verifier for firmware update artifacts.
//!
//! This crate handles:
//! - Streaming the versioned artifact container in a single pass
//! - Dispatching each payload to the handler registered for its update type
//! - SHA-256 verification of every section and payload file while it streams
//! - Ed25519 verification of the detached manifest signature
//!
//! ## Security
//!
//! - Payload content is never trusted before its checksum matches the manifest
//! - Checksum mismatches always fail the read
//! - Signature outcomes never fail the read; they are reported as a
//!   [`SignatureStatus`] so the caller decides what to trust
//! - Input sizes are bounded, and malformed input is an error, never a panic
//!
//! ## Example
//!
//! ```no_run
//! use fwa_reader::{ArtifactReader, Ed25519Verifier};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let verifier = Ed25519Verifier::from_key_str("ed25519:...")?;
//! let reader = ArtifactReader::new().with_verifier(verifier);
//! let artifact = reader.read_file(std::path::Path::new("release-1.mender"))?;
//! println!("{} is {:?}", artifact.name, artifact.signature);
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod checksum;
pub mod config;
pub mod container;
pub mod error;
pub mod handler;
pub mod header;
pub mod manifest;
pub mod payload;
pub mod reader;
pub mod signature;

#[cfg(test)]
mod fixture;
#[cfg(test)]
mod proptests;

// Re-export main types for convenience
pub use artifact::{
    Artifact, ArtifactDepends, ArtifactInfo, ArtifactProvides, FileEntry, MetaData, SectionValue,
    Update, UpdateDepends, UpdateProvides,
};
pub use checksum::{ChecksumVerifier, HashingReader, Sha256Digest};
pub use config::{HandlerConfig, LimitsConfig, ReaderConfig, SecurityConfig};
pub use error::{ConfigError, ReadError, ReadErrorKind, SectionError, SectionKind};
pub use handler::{HandlerRegistry, ModuleImageHandler, RootfsImageHandler, UpdateHandler};
pub use reader::{ArtifactReader, ReadState};
pub use signature::{check_signature, Ed25519Verifier, SignatureStatus, SignatureVerifier, VerifyError};
