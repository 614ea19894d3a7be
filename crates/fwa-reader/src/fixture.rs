//! Test-only artifact builder.
//!
//! Produces byte-exact containers for the reader tests. Entries are built
//! as a list first so tests can reorder, drop or corrupt them before
//! packing.

#![cfg(test)]

use std::collections::BTreeMap;
use std::io::Write;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};
use flate2::write::GzEncoder;
use serde_json::{json, Value};

use crate::checksum::Sha256Digest;
use crate::manifest::data_path;

/// Modification time stamped on every fixture tar entry.
pub(crate) const FIXTURE_MTIME: u64 = 1_700_000_000;

/// Pack `(name, content)` pairs into a tar archive.
pub(crate) fn tar_bytes(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(FIXTURE_MTIME);
        header.set_entry_type(tar::EntryType::Regular);
        builder
            .append_data(&mut header, name, data.as_slice())
            .unwrap();
    }
    builder.into_inner().unwrap()
}

pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Deterministic signing key for tests.
pub(crate) fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

/// One payload of a fixture artifact.
#[derive(Debug, Clone)]
pub(crate) struct PayloadFixture {
    pub update_type: String,
    pub files: Vec<(String, Vec<u8>)>,
    pub provides: Option<Value>,
    pub depends: Option<Value>,
    pub clears_provides: Vec<String>,
    pub meta_data: Option<Vec<u8>>,
}

impl PayloadFixture {
    pub fn new(update_type: &str) -> Self {
        Self {
            update_type: update_type.to_string(),
            files: Vec::new(),
            provides: None,
            depends: None,
            clears_provides: Vec::new(),
            meta_data: None,
        }
    }

    pub fn file(mut self, name: &str, data: impl Into<Vec<u8>>) -> Self {
        self.files.push((name.to_string(), data.into()));
        self
    }

    pub fn provides(mut self, provides: Value) -> Self {
        self.provides = Some(provides);
        self
    }

    pub fn depends(mut self, depends: Value) -> Self {
        self.depends = Some(depends);
        self
    }

    pub fn clears(mut self, pattern: &str) -> Self {
        self.clears_provides.push(pattern.to_string());
        self
    }

    pub fn meta_data(mut self, raw: impl Into<Vec<u8>>) -> Self {
        self.meta_data = Some(raw.into());
        self
    }
}

/// Builds artifact containers in the version 2 or 3 layout.
#[derive(Debug, Clone)]
pub(crate) struct ArtifactBuilder {
    format: String,
    version: u64,
    name: String,
    devices: Vec<String>,
    group: Option<String>,
    depends_artifacts: Vec<String>,
    depends_groups: Vec<String>,
    scripts: Vec<String>,
    payloads: Vec<PayloadFixture>,
    signing_key: Option<SigningKey>,
    gzip: bool,
    checksum_overrides: BTreeMap<String, Sha256Digest>,
}

impl ArtifactBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            format: "mender".to_string(),
            version: 3,
            name: name.to_string(),
            devices: vec!["qemux86-64".to_string()],
            group: None,
            depends_artifacts: Vec::new(),
            depends_groups: Vec::new(),
            scripts: Vec::new(),
            payloads: Vec::new(),
            signing_key: None,
            gzip: true,
            checksum_overrides: BTreeMap::new(),
        }
    }

    pub fn format(mut self, format: &str) -> Self {
        self.format = format.to_string();
        self
    }

    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn devices(mut self, devices: &[&str]) -> Self {
        self.devices = devices.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    pub fn depends_on_artifact(mut self, name: &str) -> Self {
        self.depends_artifacts.push(name.to_string());
        self
    }

    pub fn depends_on_group(mut self, group: &str) -> Self {
        self.depends_groups.push(group.to_string());
        self
    }

    pub fn script(mut self, name: &str) -> Self {
        self.scripts.push(name.to_string());
        self
    }

    pub fn payload(mut self, payload: PayloadFixture) -> Self {
        self.payloads.push(payload);
        self
    }

    pub fn signed_with(mut self, key: SigningKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// Store the header and data archives uncompressed.
    pub fn plain(mut self) -> Self {
        self.gzip = false;
        self
    }

    /// Declare `digest` for `path` in the manifest instead of the real one.
    pub fn override_checksum(mut self, path: &str, digest: Sha256Digest) -> Self {
        self.checksum_overrides.insert(path.to_string(), digest);
        self
    }

    fn suffix(&self) -> &'static str {
        if self.gzip {
            ".tar.gz"
        } else {
            ".tar"
        }
    }

    fn compress(&self, tar: Vec<u8>) -> Vec<u8> {
        if self.gzip {
            gzip(&tar)
        } else {
            tar
        }
    }

    fn header_info(&self) -> Value {
        let types: Vec<Value> = self
            .payloads
            .iter()
            .map(|p| json!({ "type": p.update_type }))
            .collect();

        if self.version == 2 {
            return json!({
                "updates": types,
                "artifact_name": self.name,
                "device_types_compatible": self.devices,
            });
        }

        let mut provides = json!({ "artifact_name": self.name });
        if let Some(group) = &self.group {
            provides["artifact_group"] = json!(group);
        }
        let mut depends = json!({ "device_type": self.devices });
        if !self.depends_artifacts.is_empty() {
            depends["artifact_name"] = json!(self.depends_artifacts);
        }
        if !self.depends_groups.is_empty() {
            depends["artifact_group"] = json!(self.depends_groups);
        }
        json!({
            "payloads": types,
            "artifact_provides": provides,
            "artifact_depends": depends,
        })
    }

    fn type_info(&self, payload: &PayloadFixture) -> Value {
        let mut type_info = json!({ "type": payload.update_type });
        if self.version == 2 {
            return type_info;
        }
        if let Some(provides) = &payload.provides {
            type_info["artifact_provides"] = provides.clone();
        }
        if let Some(depends) = &payload.depends {
            type_info["artifact_depends"] = depends.clone();
        }
        if !payload.clears_provides.is_empty() {
            type_info["clears_artifact_provides"] = json!(payload.clears_provides);
        }
        type_info
    }

    fn header_entries(&self) -> Vec<(String, Vec<u8>)> {
        let mut entries = vec![("header-info".to_string(), self.header_info().to_string().into_bytes())];
        for script in &self.scripts {
            entries.push((format!("scripts/{script}"), b"#!/bin/sh\nexit 0\n".to_vec()));
        }
        for (index, payload) in self.payloads.iter().enumerate() {
            if self.version == 2 {
                let names: Vec<&str> = payload.files.iter().map(|(n, _)| n.as_str()).collect();
                entries.push((
                    format!("headers/{index:04}/files"),
                    json!({ "files": names }).to_string().into_bytes(),
                ));
            }
            entries.push((
                format!("headers/{index:04}/type-info"),
                self.type_info(payload).to_string().into_bytes(),
            ));
            if let Some(meta_data) = &payload.meta_data {
                entries.push((format!("headers/{index:04}/meta-data"), meta_data.clone()));
            }
        }
        entries
    }

    /// Outer archive entries in container order.
    pub fn entries(&self) -> Vec<(String, Vec<u8>)> {
        let version = json!({ "format": self.format, "version": self.version })
            .to_string()
            .into_bytes();
        let header_name = format!("header{}", self.suffix());
        let header = self.compress(tar_bytes(&self.header_entries()));

        let mut checksums = BTreeMap::new();
        checksums.insert("version".to_string(), Sha256Digest::of(&version));
        checksums.insert(header_name.clone(), Sha256Digest::of(&header));

        let mut data = Vec::new();
        for (index, payload) in self.payloads.iter().enumerate() {
            for (name, content) in &payload.files {
                checksums.insert(data_path(index, name), Sha256Digest::of(content));
            }
            data.push((
                format!("data/{index:04}{}", self.suffix()),
                self.compress(tar_bytes(&payload.files)),
            ));
        }
        for (path, digest) in &self.checksum_overrides {
            checksums.insert(path.clone(), *digest);
        }

        let manifest: String = checksums
            .iter()
            .map(|(path, digest)| format!("{digest}  {path}\n"))
            .collect();
        let manifest = manifest.into_bytes();

        let mut entries = vec![
            ("version".to_string(), version),
            ("manifest".to_string(), manifest.clone()),
        ];
        if let Some(key) = &self.signing_key {
            let signature = STANDARD.encode(key.sign(&manifest).to_bytes());
            entries.push(("manifest.sig".to_string(), signature.into_bytes()));
        }
        entries.push((header_name, header));
        entries.extend(data);
        entries
    }

    pub fn build(&self) -> Vec<u8> {
        tar_bytes(&self.entries())
    }
}

/// Single rootfs-image artifact carrying one small image file.
pub(crate) fn rootfs_artifact(name: &str) -> ArtifactBuilder {
    ArtifactBuilder::new(name).payload(
        PayloadFixture::new("rootfs-image")
            .file("rootfs.img", b"rootfs image content".to_vec())
            .provides(json!({ "rootfs-image.version": name })),
    )
}
