//! Single-pass artifact reader.
//!
//! [`ArtifactReader`] streams a container once, front to back. Its
//! progress is tracked as a [`ReadState`] that only ever moves forward:
//!
//! ```text
//! Start -> ReadingInfo -> [ReadingSignature] -> ReadingMeta -> ReadingUpdates -> Done
//! ```
//!
//! Any fatal error moves the pass to `Failed` and the caller gets the error
//! alone, never a partial artifact.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::artifact::{Artifact, ArtifactInfo};
use crate::checksum::{ChecksumVerifier, HashingReader};
use crate::config::{LimitsConfig, ReaderConfig};
use crate::container::{entry_name, parse_header, read_bounded, Decompressor, OuterEntry, ParsedHeader};
use crate::error::{ConfigError, ReadError, ReadErrorKind};
use crate::handler::HandlerRegistry;
use crate::header::parse_version;
use crate::manifest::{ChecksumManifest, MANIFEST_ENTRY};
use crate::payload::PayloadContext;
use crate::signature::{check_signature, SignatureStatus, SignatureVerifier};

/// Progress of one read pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    Start,
    ReadingInfo,
    ReadingSignature,
    ReadingMeta,
    ReadingUpdates,
    Done,
    Failed(ReadErrorKind),
}

impl ReadState {
    /// Whether the pass may move from `self` to `next`.
    pub fn can_enter(self, next: ReadState) -> bool {
        use ReadState::*;
        matches!(
            (self, next),
            (Start, ReadingInfo)
                | (ReadingInfo, ReadingInfo)
                | (ReadingInfo, ReadingSignature)
                | (ReadingInfo | ReadingSignature, ReadingMeta)
                | (ReadingMeta | ReadingUpdates, ReadingUpdates)
                | (ReadingMeta | ReadingUpdates, Done)
        ) || (matches!(next, Failed(_)) && !matches!(self, Done | Failed(_)))
    }
}

impl fmt::Display for ReadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadState::Start => write!(f, "start"),
            ReadState::ReadingInfo => write!(f, "reading info"),
            ReadState::ReadingSignature => write!(f, "reading signature"),
            ReadState::ReadingMeta => write!(f, "reading header"),
            ReadState::ReadingUpdates => write!(f, "reading updates"),
            ReadState::Done => write!(f, "done"),
            ReadState::Failed(kind) => write!(f, "failed ({kind:?})"),
        }
    }
}

/// Reads and verifies artifacts.
///
/// A reader is configured once and can read any number of artifacts. It
/// holds no per-read state, so reads of the same bytes always produce equal
/// results.
pub struct ArtifactReader {
    registry: HandlerRegistry,
    verifier: Option<Box<dyn SignatureVerifier>>,
    limits: LimitsConfig,
}

impl ArtifactReader {
    /// Reader with the default handlers, default limits and no key.
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::with_defaults(),
            verifier: None,
            limits: LimitsConfig::default(),
        }
    }

    /// Check signatures with `verifier`.
    pub fn with_verifier(mut self, verifier: impl SignatureVerifier + 'static) -> Self {
        self.verifier = Some(Box::new(verifier));
        self
    }

    /// Replace the handler registry.
    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Build a reader from configuration.
    ///
    /// Key and handler problems are reported here, before any artifact is
    /// opened.
    pub fn from_config(config: &ReaderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = HandlerRegistry::from_config(&config.handlers)?;
        let mut reader = Self::new()
            .with_registry(registry)
            .with_limits(config.limits.clone());
        if let Some(verifier) = config.security.load_verifier()? {
            reader = reader.with_verifier(verifier);
        }
        Ok(reader)
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Whether a verification key is configured.
    pub fn has_verifier(&self) -> bool {
        self.verifier.is_some()
    }

    /// Read an artifact from a byte stream.
    ///
    /// # Errors
    ///
    /// Any [`ReadError`]. Signature problems are not errors; they are
    /// reported in [`Artifact::signature`].
    pub fn read<R: Read>(&self, source: R) -> Result<Artifact, ReadError> {
        let mut pass = ReadPass::new(self);
        match pass.run(source) {
            Ok(artifact) => Ok(artifact),
            Err(err) => {
                let failed_in = pass.state;
                pass.state = ReadState::Failed(err.kind());
                tracing::error!(failed_in = %failed_in, state = %pass.state, error = %err, "Artifact read failed");
                Err(err)
            }
        }
    }

    /// Open and read an artifact file.
    pub fn read_file(&self, path: &Path) -> Result<Artifact, ReadError> {
        let file = File::open(path)?;
        tracing::debug!(path = %path.display(), "Reading artifact file");
        self.read(BufReader::new(file))
    }
}

impl Default for ArtifactReader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ArtifactReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactReader")
            .field("registry", &self.registry)
            .field("verifier", &self.verifier.as_ref().map(|v| v.description()))
            .field("limits", &self.limits)
            .finish()
    }
}

/// State of one pass over one container.
struct ReadPass<'r> {
    reader: &'r ArtifactReader,
    state: ReadState,
    info: Option<ArtifactInfo>,
    version_checksum: Option<ChecksumVerifier>,
    manifest: Option<ChecksumManifest>,
    signature: SignatureStatus,
    header_name: Option<String>,
    header: Option<ParsedHeader>,
    next_data: usize,
}

impl<'r> ReadPass<'r> {
    fn new(reader: &'r ArtifactReader) -> Self {
        Self {
            reader,
            state: ReadState::Start,
            info: None,
            version_checksum: None,
            manifest: None,
            signature: SignatureStatus::Unsigned,
            header_name: None,
            header: None,
            next_data: 0,
        }
    }

    fn enter(&mut self, next: ReadState, section: &str) -> Result<(), ReadError> {
        if !self.state.can_enter(next) {
            return Err(ReadError::malformed(
                section,
                format!("out of order while {}", self.state),
            ));
        }
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "Reader state transition");
        }
        self.state = next;
        Ok(())
    }

    fn run<R: Read>(&mut self, source: R) -> Result<Artifact, ReadError> {
        const SECTION: &str = "artifact";

        let mut archive = tar::Archive::new(source);
        let entries = archive
            .entries()
            .map_err(|e| ReadError::from_stream(SECTION, e))?;

        for entry in entries {
            let entry = entry.map_err(|e| ReadError::from_stream(SECTION, e))?;
            let name = entry_name(&entry, SECTION)?;

            match OuterEntry::classify(&name)? {
                OuterEntry::Version => self.read_version(entry, &name)?,
                OuterEntry::Manifest => self.read_manifest(entry, &name)?,
                OuterEntry::ManifestSig => self.read_signature(entry, &name)?,
                OuterEntry::Header(compression) => {
                    self.enter(ReadState::ReadingMeta, &name)?;
                    let (info, manifest) = self.info_and_manifest(&name)?;
                    let version = info.version;
                    let expected = *manifest.require(&name)?;

                    let mut hashing = HashingReader::new(entry, name.clone());
                    let parsed = parse_header(
                        Decompressor::new(&mut hashing, compression),
                        version,
                        &self.reader.registry,
                        &self.reader.limits,
                    );
                    // A parse failure on bytes that do not match the manifest
                    // is reported as the checksum mismatch.
                    hashing
                        .drain()
                        .map_err(|e| ReadError::from_stream(&name, e))?;
                    hashing.finish_and_verify(&expected)?;
                    let header = parsed?;

                    self.header_name = Some(name);
                    self.header = Some(header);
                }
                OuterEntry::Data { index, compression } => {
                    self.enter(ReadState::ReadingUpdates, &name)?;
                    self.read_data(Decompressor::new(entry, compression), index, &name)?;
                }
            }
        }

        self.finish()
    }

    fn read_version<R: Read>(&mut self, entry: R, name: &str) -> Result<(), ReadError> {
        self.enter(ReadState::ReadingInfo, name)?;
        if self.info.is_some() {
            return Err(ReadError::malformed(name, "duplicate version entry"));
        }

        let raw = read_bounded(entry, self.reader.limits.max_metadata_bytes, name)?;
        let info = parse_version(&raw)?;
        let mut checksum = ChecksumVerifier::new(name);
        checksum.update(&raw);

        tracing::debug!(format = %info.format, version = info.version, "Read artifact version");
        self.info = Some(info);
        self.version_checksum = Some(checksum);
        Ok(())
    }

    fn read_manifest<R: Read>(&mut self, entry: R, name: &str) -> Result<(), ReadError> {
        self.enter(ReadState::ReadingInfo, name)?;
        if self.info.is_none() {
            return Err(ReadError::malformed(name, "version must come first"));
        }
        if self.manifest.is_some() {
            return Err(ReadError::malformed(name, "duplicate manifest"));
        }

        let raw = read_bounded(entry, self.reader.limits.max_metadata_bytes, name)?;
        let manifest = ChecksumManifest::parse(raw)?;
        if let Some(checksum) = self.version_checksum.take() {
            let expected = manifest.require(checksum.name())?;
            checksum.verify(expected)?;
        }
        self.manifest = Some(manifest);
        Ok(())
    }

    fn read_signature<R: Read>(&mut self, entry: R, name: &str) -> Result<(), ReadError> {
        self.enter(ReadState::ReadingSignature, name)?;
        let manifest = self
            .manifest
            .as_ref()
            .ok_or_else(|| ReadError::malformed(name, "manifest must precede its signature"))?;

        let raw = read_bounded(entry, self.reader.limits.max_metadata_bytes, name)?;
        self.signature = check_signature(
            self.reader.verifier.as_deref(),
            manifest.canonical_message(),
            &raw,
        );
        Ok(())
    }

    fn read_data<R: Read>(&mut self, mut stream: R, index: usize, name: &str) -> Result<(), ReadError> {
        if index != self.next_data {
            return Err(ReadError::malformed(
                name,
                format!("expected data section {:04}", self.next_data),
            ));
        }

        let manifest = self
            .manifest
            .as_ref()
            .ok_or_else(|| ReadError::malformed(name, "missing manifest"))?;
        let header = self
            .header
            .as_mut()
            .ok_or_else(|| ReadError::malformed(name, "missing header"))?;
        let payload = header
            .payloads
            .get_mut(index)
            .ok_or_else(|| ReadError::malformed(name, "no payload declared at this index"))?;

        let handler = self.reader.registry.lookup(&payload.update.update_type)?;
        let ctx = PayloadContext {
            index,
            manifest,
            declared_files: payload.declared_files.as_deref(),
            max_files: None,
        };
        let files = handler.decode_files(&mut stream, &ctx)?;

        tracing::debug!(
            payload = index,
            update_type = %payload.update.update_type,
            files = files.len(),
            "Read payload"
        );
        payload.update.files = files;
        self.next_data += 1;
        Ok(())
    }

    fn info_and_manifest(&self, section: &str) -> Result<(&ArtifactInfo, &ChecksumManifest), ReadError> {
        let info = self
            .info
            .as_ref()
            .ok_or_else(|| ReadError::malformed(section, "missing version"))?;
        let manifest = self
            .manifest
            .as_ref()
            .ok_or_else(|| ReadError::malformed(section, "missing manifest"))?;
        Ok((info, manifest))
    }

    fn finish(&mut self) -> Result<Artifact, ReadError> {
        const SECTION: &str = "artifact";

        let (info, manifest) = self.info_and_manifest(SECTION)?;
        let header = self
            .header
            .as_ref()
            .ok_or_else(|| ReadError::malformed(SECTION, "missing header"))?;
        if self.next_data != header.payloads.len() {
            return Err(ReadError::malformed(
                SECTION,
                format!("missing data section {:04}", self.next_data),
            ));
        }
        check_manifest_coverage(manifest, self.header_name.as_deref(), header.payloads.len())?;
        let info = info.clone();

        self.enter(ReadState::Done, SECTION)?;
        let header = self
            .header
            .take()
            .ok_or_else(|| ReadError::malformed(SECTION, "missing header"))?;

        let artifact = Artifact {
            name: header.info.name,
            info,
            compatible_devices: header.info.compatible_devices,
            provides: header.info.provides,
            depends: header.info.depends,
            signature: self.signature,
            updates: header.payloads.into_iter().map(|p| p.update).collect(),
            scripts: header.scripts,
        };

        tracing::info!(
            artifact_name = %artifact.name,
            version = artifact.info.version,
            updates = artifact.updates.len(),
            signature = ?artifact.signature,
            "Artifact read"
        );
        Ok(artifact)
    }
}

/// Every manifest line must name a section that was actually read.
fn check_manifest_coverage(
    manifest: &ChecksumManifest,
    header_name: Option<&str>,
    payloads: usize,
) -> Result<(), ReadError> {
    for path in manifest.paths() {
        let known = path == "version"
            || Some(path) == header_name
            || path
                .strip_prefix("data/")
                .and_then(|rest| rest.split_once('/'))
                .and_then(|(index, _)| index.parse::<usize>().ok())
                .is_some_and(|index| index < payloads);
        if !known {
            return Err(ReadError::malformed(
                MANIFEST_ENTRY,
                format!("{path} does not name a section of this artifact"),
            ));
        }
    }
    Ok(())
}
