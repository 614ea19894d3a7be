//! Detached signature verification.
//!
//! An artifact may carry `manifest.sig`, a base64 encoded signature over the
//! exact bytes of its `manifest` entry. The manifest pins the digest of every
//! other section, so checking this one signature covers the whole container.
//!
//! Signature checks never fail a read. The outcome is reported as a
//! [`SignatureStatus`] and the caller decides how far to trust the artifact.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::Serialize;
use thiserror::Error;

use crate::config::parse_ed25519_key;
use crate::error::ConfigError;

/// A signature that did not verify.
#[derive(Debug, Error)]
#[error("signature verification failed: {0}")]
pub struct VerifyError(pub String);

impl From<ed25519_dalek::SignatureError> for VerifyError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        VerifyError(err.to_string())
    }
}

/// Verifies a detached signature over a message.
///
/// Implementations must be pure: the same message, signature and key always
/// give the same answer.
pub trait SignatureVerifier: Send + Sync {
    /// Verify `signature` over `message`.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if the signature is malformed or does not match.
    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), VerifyError>;

    /// Get a description of this verifier for logging.
    fn description(&self) -> &str;
}

/// Ed25519 verifier bound to a single public key.
#[derive(Debug, Clone)]
pub struct Ed25519Verifier {
    key: VerifyingKey,
}

impl Ed25519Verifier {
    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Build a verifier from an `ed25519:<hex|base64>` key string.
    pub fn from_key_str(s: &str) -> Result<Self, ConfigError> {
        parse_ed25519_key(s).map(Self::new)
    }

    pub fn key(&self) -> &VerifyingKey {
        &self.key
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), VerifyError> {
        let signature = Signature::from_slice(signature)?;
        self.key.verify(message, &signature)?;
        Ok(())
    }

    fn description(&self) -> &str {
        "Ed25519"
    }
}

/// How far an artifact's signature could be checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    /// The artifact carries no signature
    Unsigned,
    /// The artifact is signed but no key was supplied to check it
    NoKeyProvided,
    /// The signature verified against the supplied key
    Verified,
    /// The signature did not verify against the supplied key
    VerificationFailed,
}

impl SignatureStatus {
    /// Whether the artifact carries a signature at all.
    pub fn is_signed(&self) -> bool {
        !matches!(self, SignatureStatus::Unsigned)
    }

    /// Whether the contents can be trusted on the strength of the signature.
    pub fn is_verified(&self) -> bool {
        matches!(self, SignatureStatus::Verified)
    }
}

/// Check an encoded detached signature over `message`.
///
/// `encoded` is the raw content of `manifest.sig`: base64, optionally
/// surrounded by whitespace. A signature that cannot even be decoded counts
/// as a failed verification when a key is present.
pub fn check_signature(
    verifier: Option<&dyn SignatureVerifier>,
    message: &[u8],
    encoded: &[u8],
) -> SignatureStatus {
    let Some(verifier) = verifier else {
        tracing::debug!("Artifact is signed but no verification key was provided");
        return SignatureStatus::NoKeyProvided;
    };

    let signature = match STANDARD.decode(trim_whitespace(encoded)) {
        Ok(signature) => signature,
        Err(e) => {
            tracing::warn!(error = %e, "Artifact signature is not valid base64");
            return SignatureStatus::VerificationFailed;
        }
    };

    match verifier.verify(message, &signature) {
        Ok(()) => {
            tracing::debug!(verifier = verifier.description(), "Artifact signature verified");
            SignatureStatus::Verified
        }
        Err(e) => {
            tracing::warn!(
                verifier = verifier.description(),
                error = %e,
                "Artifact signature verification failed"
            );
            SignatureStatus::VerificationFailed
        }
    }
}

fn trim_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
