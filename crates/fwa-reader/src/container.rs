//! Container layout: entry names, compression and the header archive.
//!
//! The outer stream is a plain tar archive. Its `header.tar[.gz]` entry is
//! itself a tar archive holding `header-info`, state scripts and one
//! `headers/NNNN/` directory per payload. This module knows those names and
//! their required order; [`crate::reader`] drives the outer archive.

use std::io::{self, Read};

use flate2::read::GzDecoder;

use crate::artifact::{SectionValue, Update};
use crate::config::LimitsConfig;
use crate::error::{ReadError, SectionError};
use crate::handler::HandlerRegistry;
use crate::header::{parse_files_list, HeaderInfo, TypeInfo};

/// Compression of an inner archive, taken from its name suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

/// Recognised entries of the outer archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OuterEntry {
    Version,
    Manifest,
    ManifestSig,
    Header(Compression),
    Data { index: usize, compression: Compression },
}

impl OuterEntry {
    /// Classify an outer entry name.
    ///
    /// # Errors
    ///
    /// `MalformedContainer` for augmented artifacts, unsupported
    /// compression and any name outside the known layout.
    pub fn classify(name: &str) -> Result<Self, ReadError> {
        match name {
            "version" => return Ok(OuterEntry::Version),
            "manifest" => return Ok(OuterEntry::Manifest),
            "manifest.sig" => return Ok(OuterEntry::ManifestSig),
            _ => {}
        }
        if name.starts_with("manifest-augment") || name.starts_with("header-augment") {
            return Err(ReadError::malformed(name, "augmented artifacts are not supported"));
        }

        if let Some((stem, compression)) = split_compression(name)? {
            if stem == "header" {
                return Ok(OuterEntry::Header(compression));
            }
            if let Some(index) = stem.strip_prefix("data/").and_then(parse_index) {
                return Ok(OuterEntry::Data { index, compression });
            }
        }

        Err(ReadError::malformed(name, "unexpected entry in artifact"))
    }
}

fn split_compression(name: &str) -> Result<Option<(&str, Compression)>, ReadError> {
    if let Some(stem) = name.strip_suffix(".tar.gz") {
        return Ok(Some((stem, Compression::Gzip)));
    }
    if let Some(stem) = name.strip_suffix(".tar") {
        return Ok(Some((stem, Compression::None)));
    }
    for suffix in [".tar.xz", ".tar.zst", ".tar.bz2"] {
        if name.ends_with(suffix) {
            return Err(ReadError::malformed(
                name,
                format!("unsupported compression {}", &suffix[5..]),
            ));
        }
    }
    Ok(None)
}

/// Parse a zero-padded payload index such as `0000`.
fn parse_index(s: &str) -> Option<usize> {
    if s.len() < 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Streaming decompressor for an inner archive.
pub enum Decompressor<R: Read> {
    Plain(R),
    Gzip(GzDecoder<R>),
}

impl<R: Read> Decompressor<R> {
    pub fn new(inner: R, compression: Compression) -> Self {
        match compression {
            Compression::None => Decompressor::Plain(inner),
            Compression::Gzip => Decompressor::Gzip(GzDecoder::new(inner)),
        }
    }
}

impl<R: Read> Read for Decompressor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Decompressor::Plain(r) => r.read(buf),
            Decompressor::Gzip(r) => r.read(buf),
        }
    }
}

/// Read a small entry fully, refusing anything over `limit` bytes.
pub fn read_bounded<R: Read>(reader: R, limit: u64, section: &str) -> Result<Vec<u8>, ReadError> {
    let mut buf = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut buf)
        .map_err(|e| ReadError::from_stream(section, e))?;
    if buf.len() as u64 > limit {
        return Err(ReadError::malformed(
            section,
            format!("entry exceeds the {limit} byte limit"),
        ));
    }
    Ok(buf)
}

/// Everything the header archive declares.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedHeader {
    pub info: HeaderInfo,
    pub scripts: Vec<String>,
    pub payloads: Vec<PayloadHeader>,
}

/// Decoded header of one payload. `update.files` is filled in later from
/// the payload's data section.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadHeader {
    pub update: Update,
    /// File names from a version 2 `files` list
    pub declared_files: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PayloadPart {
    Files,
    TypeInfo,
    MetaData,
}

enum HeaderEntry {
    Info,
    Script(String),
    Payload { index: usize, part: PayloadPart },
}

impl HeaderEntry {
    fn classify(name: &str) -> Result<Self, ReadError> {
        if name == "header-info" {
            return Ok(HeaderEntry::Info);
        }
        if let Some(script) = name.strip_prefix("scripts/") {
            if !script.is_empty() && !script.contains('/') {
                return Ok(HeaderEntry::Script(script.to_string()));
            }
        }
        if let Some((index, part)) = name
            .strip_prefix("headers/")
            .and_then(|rest| rest.split_once('/'))
        {
            let part = match part {
                "files" => Some(PayloadPart::Files),
                "type-info" => Some(PayloadPart::TypeInfo),
                "meta-data" => Some(PayloadPart::MetaData),
                _ => None,
            };
            if let (Some(index), Some(part)) = (parse_index(index), part) {
                return Ok(HeaderEntry::Payload { index, part });
            }
        }
        Err(ReadError::malformed(name, "unexpected entry in header"))
    }
}

#[derive(Default)]
struct PendingPayload {
    last_part: Option<PayloadPart>,
    files: Option<Vec<String>>,
    type_info: Option<TypeInfo>,
    meta_data: Option<Vec<u8>>,
}

/// Walk the (decompressed) header archive.
///
/// Handlers are looked up as soon as `header-info` names the payload types,
/// so an unsupported type fails the read before any payload is streamed.
pub fn parse_header<R: Read>(
    reader: R,
    version: u64,
    registry: &HandlerRegistry,
    limits: &LimitsConfig,
) -> Result<ParsedHeader, ReadError> {
    const SECTION: &str = "header";

    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| ReadError::from_stream(SECTION, e))?;

    let mut info: Option<HeaderInfo> = None;
    let mut scripts = Vec::new();
    let mut pending: Vec<PendingPayload> = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| ReadError::from_stream(SECTION, e))?;
        let name = entry_name(&entry, SECTION)?;

        match HeaderEntry::classify(&name)? {
            HeaderEntry::Info => {
                if info.is_some() {
                    return Err(ReadError::malformed(&name, "duplicate header-info"));
                }
                let raw = read_bounded(entry, limits.max_metadata_bytes, &name)?;
                let parsed = HeaderInfo::parse(version, &raw)?;
                if parsed.update_types.len() > limits.max_payloads {
                    return Err(ReadError::malformed(
                        &name,
                        format!(
                            "{} payloads declared, limit is {}",
                            parsed.update_types.len(),
                            limits.max_payloads
                        ),
                    ));
                }
                for update_type in &parsed.update_types {
                    registry.lookup(update_type)?;
                }
                tracing::debug!(
                    artifact_name = %parsed.name,
                    payloads = parsed.update_types.len(),
                    "Parsed header-info"
                );
                info = Some(parsed);
            }
            HeaderEntry::Script(script) => {
                if info.is_none() {
                    return Err(ReadError::malformed(&name, "header-info must come first"));
                }
                if !pending.is_empty() {
                    return Err(ReadError::malformed(
                        &name,
                        "state scripts must precede payload headers",
                    ));
                }
                tracing::debug!(script = %script, "Found state script");
                scripts.push(script);
            }
            HeaderEntry::Payload { index, part } => {
                let declared = info
                    .as_ref()
                    .ok_or_else(|| ReadError::malformed(&name, "header-info must come first"))?;
                if index >= declared.update_types.len() {
                    return Err(ReadError::malformed(&name, "no payload declared at this index"));
                }

                if index == pending.len() {
                    if let Some(previous) = pending.last() {
                        require_type_info(previous, pending.len() - 1)?;
                    }
                    pending.push(PendingPayload::default());
                } else if index + 1 != pending.len() {
                    return Err(ReadError::malformed(&name, "payload headers out of order"));
                }

                let payload = pending
                    .last_mut()
                    .ok_or_else(|| ReadError::malformed(&name, "payload headers out of order"))?;
                if payload.last_part.is_some_and(|last| part <= last) {
                    return Err(ReadError::malformed(&name, "duplicate or out of order entry"));
                }
                payload.last_part = Some(part);

                let raw = read_bounded(entry, limits.max_metadata_bytes, &name)?;
                match part {
                    PayloadPart::Files => {
                        if version != 2 {
                            return Err(ReadError::malformed(
                                &name,
                                "files lists are only valid in version 2 artifacts",
                            ));
                        }
                        payload.files = Some(parse_files_list(&name, &raw)?);
                    }
                    PayloadPart::TypeInfo => {
                        let type_info = TypeInfo::parse(&name, &raw)?;
                        let expected = &declared.update_types[index];
                        if &type_info.update_type != expected {
                            return Err(ReadError::malformed(
                                &name,
                                format!(
                                    "type {} does not match header-info type {expected}",
                                    type_info.update_type
                                ),
                            ));
                        }
                        payload.type_info = Some(type_info);
                    }
                    PayloadPart::MetaData => payload.meta_data = Some(raw),
                }
            }
        }
    }

    let info = info.ok_or_else(|| ReadError::malformed(SECTION, "missing header-info"))?;
    if pending.len() != info.update_types.len() {
        return Err(ReadError::malformed(
            SECTION,
            format!(
                "{} payloads declared but {} have headers",
                info.update_types.len(),
                pending.len()
            ),
        ));
    }

    let mut payloads = Vec::with_capacity(pending.len());
    for (index, payload) in pending.into_iter().enumerate() {
        require_type_info(&payload, index)?;
        payloads.push(decode_payload(index, payload, registry)?);
    }

    Ok(ParsedHeader {
        info,
        scripts,
        payloads,
    })
}

fn require_type_info(payload: &PendingPayload, index: usize) -> Result<(), ReadError> {
    if payload.type_info.is_none() {
        return Err(ReadError::malformed(
            format!("headers/{index:04}"),
            "missing type-info",
        ));
    }
    Ok(())
}

fn decode_payload(
    index: usize,
    payload: PendingPayload,
    registry: &HandlerRegistry,
) -> Result<PayloadHeader, ReadError> {
    let type_info = payload
        .type_info
        .ok_or_else(|| ReadError::malformed(format!("headers/{index:04}"), "missing type-info"))?;
    let handler = registry.lookup(&type_info.update_type)?;

    let provides = match &type_info.artifact_provides {
        None | Some(serde_json::Value::Null) => SectionValue::Absent,
        Some(raw) => SectionValue::from_result(handler.decode_provides(raw)),
    };
    let depends = match &type_info.artifact_depends {
        None | Some(serde_json::Value::Null) => SectionValue::Absent,
        Some(raw) => SectionValue::from_result(handler.decode_depends(raw)),
    };
    let meta_data = match payload.meta_data {
        Some(raw) if !raw.iter().all(u8::is_ascii_whitespace) => {
            SectionValue::from_result(handler.decode_meta_data(&raw))
        }
        _ => SectionValue::Absent,
    };

    for err in [provides.error(), depends.error(), meta_data.error()]
        .into_iter()
        .flatten()
    {
        warn_invalid_section(index, &type_info.update_type, err);
    }

    Ok(PayloadHeader {
        update: Update {
            update_type: type_info.update_type,
            provides,
            depends,
            clears_provides: type_info.clears_artifact_provides.unwrap_or_default(),
            meta_data,
            files: Vec::new(),
        },
        declared_files: payload.files,
    })
}

fn warn_invalid_section(index: usize, update_type: &str, err: &SectionError) {
    tracing::warn!(
        payload = index,
        update_type = %update_type,
        section = %err.section,
        reason = %err.reason,
        "Invalid update section"
    );
}

/// Name of a tar entry, which must be a regular file with a UTF-8 path.
pub fn entry_name<R: Read>(entry: &tar::Entry<'_, R>, section: &str) -> Result<String, ReadError> {
    if !entry.header().entry_type().is_file() {
        return Err(ReadError::malformed(section, "archive contains a non-regular entry"));
    }
    let path = entry.path().map_err(|e| ReadError::from_stream(section, e))?;
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| ReadError::malformed(section, format!("entry name {path:?} is not UTF-8")))
}
