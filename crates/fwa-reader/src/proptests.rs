//! Property-based tests for fwa-reader.
//!
//! These tests use proptest to verify correctness properties across
//! randomly generated artifacts and inputs.
//!
//! # Properties Tested
//!
//! - Property 1: Round-trip of names, devices and file checksums
//! - Property 2: Repeated reads of the same bytes are equal
//! - Property 3: Content that does not match its checksum fails the read
//! - Property 4: Signature status follows the supplied key
//! - Property 5: Arbitrary or truncated input is an error, never a panic

#![cfg(test)]

use proptest::prelude::*;
use serde_json::json;

use ed25519_dalek::SigningKey;

use crate::checksum::Sha256Digest;
use crate::error::ReadError;
use crate::fixture::{ArtifactBuilder, PayloadFixture};
use crate::reader::ArtifactReader;
use crate::signature::{Ed25519Verifier, SignatureStatus};

// =============================================================================
// Generators
// =============================================================================

/// Generate a random Ed25519 signing key from 32 random bytes.
fn arb_signing_key() -> impl Strategy<Value = SigningKey> {
    prop::array::uniform32(any::<u8>()).prop_map(|bytes| SigningKey::from_bytes(&bytes))
}

/// Generate an artifact or device name.
fn arb_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,15}"
}

/// Generate payload file content (0 to 4KB).
fn arb_content() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..4096)
}

/// Generate between one and three payload files with distinct names.
fn arb_files() -> impl Strategy<Value = Vec<(String, Vec<u8>)>> {
    prop::collection::btree_map("[a-z]{1,8}\\.bin", arb_content(), 1..4)
        .prop_map(|files| files.into_iter().collect())
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Build a single-payload artifact around `files`.
fn build_artifact(name: &str, devices: &[String], files: &[(String, Vec<u8>)]) -> ArtifactBuilder {
    let devices: Vec<&str> = devices.iter().map(String::as_str).collect();
    let mut payload = PayloadFixture::new("single-file")
        .provides(json!({ "single-file.version": name }))
        .meta_data(json!({ "dest_dir": "/opt/app" }).to_string().into_bytes());
    for (file_name, content) in files {
        payload = payload.file(file_name, content.clone());
    }
    ArtifactBuilder::new(name).devices(&devices).payload(payload)
}

// =============================================================================
// Property 1: Round-trip
//
// *For any* artifact built from a name, a device list and payload files,
// reading it SHALL reproduce exactly those values and checksums.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_roundtrip_preserves_contents(
        name in arb_name(),
        devices in prop::collection::vec(arb_name(), 1..4),
        files in arb_files(),
        gzip in any::<bool>(),
    ) {
        let mut builder = build_artifact(&name, &devices, &files);
        if !gzip {
            builder = builder.plain();
        }
        let artifact = ArtifactReader::new().read(&builder.build()[..]).unwrap();

        prop_assert_eq!(&artifact.name, &name);
        prop_assert_eq!(&artifact.compatible_devices, &devices);
        prop_assert_eq!(artifact.updates.len(), 1);

        let update = &artifact.updates[0];
        prop_assert_eq!(update.files.len(), files.len());
        for (entry, (file_name, content)) in update.files.iter().zip(&files) {
            prop_assert_eq!(&entry.name, file_name);
            prop_assert_eq!(entry.size, content.len() as u64);
            prop_assert_eq!(&entry.checksum, &Sha256Digest::of(content).to_hex());
        }
        prop_assert_eq!(
            update.provides.valid().map(|p| p["single-file.version"].clone()),
            Some(name.clone())
        );
    }
}

// =============================================================================
// Property 2: Idempotence
//
// *For any* artifact, two reads of independent copies of its bytes SHALL
// produce equal results.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_reads_are_idempotent(
        name in arb_name(),
        files in arb_files(),
        signing_key in arb_signing_key(),
    ) {
        let data = build_artifact(&name, &["dev".to_string()], &files)
            .signed_with(signing_key.clone())
            .build();
        let copy = data.clone();
        let reader = ArtifactReader::new()
            .with_verifier(Ed25519Verifier::new(signing_key.verifying_key()));

        let first = reader.read(&data[..]).unwrap();
        let second = reader.read(&copy[..]).unwrap();
        prop_assert_eq!(first, second);
    }
}

// =============================================================================
// Property 3: Checksum mismatch is fatal
//
// *For any* payload file whose declared checksum differs from its content,
// the read SHALL fail with a checksum mismatch naming that file.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_tampered_content_rejected(
        files in arb_files(),
        victim in any::<prop::sample::Index>(),
        flip in any::<u8>().prop_filter("non-zero", |b| *b != 0),
    ) {
        let (victim_name, victim_content) = &files[victim.index(files.len())];
        let mut tampered = victim_content.clone();
        match tampered.first_mut() {
            Some(byte) => *byte ^= flip,
            None => tampered.push(flip),
        }
        let path = format!("data/0000/{victim_name}");

        let data = build_artifact("tampered", &["dev".to_string()], &files)
            .override_checksum(&path, Sha256Digest::of(&tampered))
            .build();

        match ArtifactReader::new().read(&data[..]) {
            Err(ReadError::ChecksumMismatch { file, .. }) => prop_assert_eq!(file, path),
            other => prop_assert!(false, "Expected ChecksumMismatch, got {:?}", other.map(|a| a.name)),
        }
    }
}

// =============================================================================
// Property 4: Signature status
//
// *For any* signing key, a signed artifact SHALL read as verified with the
// matching key, as failed with any other key, and as unverifiable with none.
// In every case the rest of the artifact SHALL be populated.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_signature_status_follows_key(
        signing_key in arb_signing_key(),
        other_key in arb_signing_key(),
        files in arb_files(),
    ) {
        prop_assume!(signing_key.to_bytes() != other_key.to_bytes());

        let data = build_artifact("signed", &["dev".to_string()], &files)
            .signed_with(signing_key.clone())
            .build();

        let cases = [
            (Some(signing_key.verifying_key()), SignatureStatus::Verified),
            (Some(other_key.verifying_key()), SignatureStatus::VerificationFailed),
            (None, SignatureStatus::NoKeyProvided),
        ];
        for (key, expected) in cases {
            let reader = match key {
                Some(key) => ArtifactReader::new().with_verifier(Ed25519Verifier::new(key)),
                None => ArtifactReader::new(),
            };
            let artifact = reader.read(&data[..]).unwrap();
            prop_assert_eq!(artifact.signature, expected);
            prop_assert_eq!(artifact.updates[0].files.len(), files.len());
        }
    }
}

// =============================================================================
// Property 5: Robustness
//
// *For any* byte string that is not a well-formed artifact, the read SHALL
// return an error without panicking.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_garbage_input_rejected(data in prop::collection::vec(any::<u8>(), 0..8192)) {
        prop_assert!(ArtifactReader::new().read(&data[..]).is_err());
    }

    #[test]
    fn prop_truncated_artifact_rejected(
        files in arb_files(),
        ratio in 0.0f64..0.5,
    ) {
        let data = build_artifact("truncated", &["dev".to_string()], &files).build();
        let cut = (data.len() as f64 * ratio) as usize;
        prop_assert!(ArtifactReader::new().read(&data[..cut]).is_err());
    }
}
