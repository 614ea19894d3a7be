//! Configuration structures for the artifact reader.
//!
//! Defines the verification key, resource limits and the set of update
//! module types the reader accepts on top of the built-in handlers.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::signature::Ed25519Verifier;

/// Main reader configuration.
///
/// # Example TOML
///
/// ```toml
/// [security]
/// verification_key_file = "/etc/fwa/artifact-verify.key"
///
/// [limits]
/// max_metadata_bytes = 1048576
/// max_payloads = 1024
///
/// [handlers]
/// module_types = ["swupdate", "bootloader-env"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Signature verification settings
    #[serde(default)]
    pub security: SecurityConfig,

    /// Bounds on what the reader will buffer
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Extra update types to accept
    #[serde(default)]
    pub handlers: HandlerConfig,
}

impl ReaderConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_metadata_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_metadata_bytes must be greater than 0".to_string(),
            ));
        }
        if self.limits.max_payloads == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_payloads must be greater than 0".to_string(),
            ));
        }
        if self.security.verification_key.is_some() && self.security.verification_key_file.is_some() {
            return Err(ConfigError::ValidationError(
                "set only one of security.verification_key and security.verification_key_file"
                    .to_string(),
            ));
        }
        for module_type in &self.handlers.module_types {
            if module_type.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "handlers.module_types must not contain empty names".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Security configuration for signature verification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Inline public key
    /// Format: "ed25519:<hex_or_base64_public_key>"
    #[serde(default)]
    pub verification_key: Option<String>,

    /// File holding the public key in the same format
    #[serde(default)]
    pub verification_key_file: Option<PathBuf>,
}

impl SecurityConfig {
    /// Build the configured verifier, if any key is configured.
    pub fn load_verifier(&self) -> Result<Option<Ed25519Verifier>, ConfigError> {
        if let Some(key) = &self.verification_key {
            return Ed25519Verifier::from_key_str(key).map(Some);
        }
        if let Some(path) = &self.verification_key_file {
            return load_key_file(path).map(|key| Some(Ed25519Verifier::new(key)));
        }
        Ok(None)
    }
}

/// Limits on how much the reader buffers from untrusted input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest JSON or text section read into memory, in bytes
    #[serde(default = "default_max_metadata_bytes")]
    pub max_metadata_bytes: u64,

    /// Most payloads a single artifact may declare
    #[serde(default = "default_max_payloads")]
    pub max_payloads: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_metadata_bytes: default_max_metadata_bytes(),
            max_payloads: default_max_payloads(),
        }
    }
}

/// Update types accepted in addition to the built-in set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Update module type names decoded with the generic module handler
    #[serde(default)]
    pub module_types: Vec<String>,
}

/// Load an Ed25519 public key from a key file.
///
/// The file holds one key, either `ed25519:<hex|base64>` or the bare
/// hex/base64 encoding. Surrounding whitespace is ignored.
pub fn load_key_file(path: &Path) -> Result<ed25519_dalek::VerifyingKey, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.display().to_string(),
        source,
    })?;
    let content = content.trim();
    if content.starts_with("ed25519:") {
        parse_ed25519_key(content)
    } else {
        parse_ed25519_key(&format!("ed25519:{content}"))
    }
}

/// Parse an Ed25519 public key from string format.
///
/// Supports formats:
/// - "ed25519:<hex_encoded_32_bytes>"
/// - "ed25519:<base64_encoded_32_bytes>"
pub fn parse_ed25519_key(s: &str) -> Result<ed25519_dalek::VerifyingKey, ConfigError> {
    let encoded = s
        .strip_prefix("ed25519:")
        .ok_or_else(|| ConfigError::InvalidKey("key must start with 'ed25519:'".to_string()))?;

    // Try hex first
    let key_data = match hex::decode(encoded) {
        Ok(bytes) => bytes,
        Err(_) => STANDARD
            .decode(encoded)
            .map_err(|e| ConfigError::InvalidKey(format!("invalid key encoding: {e}")))?,
    };

    let key_bytes: [u8; 32] = key_data
        .try_into()
        .map_err(|_| ConfigError::InvalidKey("Ed25519 public key must be 32 bytes".to_string()))?;

    ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| ConfigError::InvalidKey(format!("invalid Ed25519 public key: {e}")))
}

// Default value functions for serde
fn default_max_metadata_bytes() -> u64 {
    1024 * 1024
}

fn default_max_payloads() -> usize {
    1024
}
