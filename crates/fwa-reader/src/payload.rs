//! Streaming payload file verification.
//!
//! A data section is a tar archive of payload files. Each file is hashed as
//! it streams out of the archive and compared with its manifest line; file
//! content is never held in memory.

use std::collections::BTreeSet;
use std::io::Read;

use chrono::DateTime;

use crate::artifact::FileEntry;
use crate::checksum::HashingReader;
use crate::error::ReadError;
use crate::manifest::{data_dir, data_path, ChecksumManifest};

/// What a data section is checked against.
#[derive(Debug, Clone, Copy)]
pub struct PayloadContext<'a> {
    /// Payload index, matching the data section and header numbering
    pub index: usize,
    pub manifest: &'a ChecksumManifest,
    /// File names from a version 2 `files` header, if present
    pub declared_files: Option<&'a [String]>,
    /// Most files this payload type allows
    pub max_files: Option<usize>,
}

impl PayloadContext<'_> {
    fn section(&self) -> String {
        data_dir(self.index)
    }
}

/// Read every file of one data section, verifying each against the manifest.
///
/// # Errors
///
/// - `ChecksumMismatch` naming the file when its content does not match
/// - `MalformedContainer` when a file has no manifest line, appears twice,
///   is not declared by the header, exceeds the handler's file limit, or a
///   manifest line names a file the section does not contain
pub fn read_payload_files(
    stream: &mut dyn Read,
    ctx: &PayloadContext<'_>,
) -> Result<Vec<FileEntry>, ReadError> {
    let section = ctx.section();
    let mut archive = tar::Archive::new(stream);
    let entries = archive
        .entries()
        .map_err(|e| ReadError::from_stream(&section, e))?;

    let mut files = Vec::new();
    let mut seen = BTreeSet::new();

    for entry in entries {
        let entry = entry.map_err(|e| ReadError::from_stream(&section, e))?;

        if !entry.header().entry_type().is_file() {
            return Err(ReadError::malformed(
                &section,
                "payload archive contains a non-regular entry",
            ));
        }

        let name = {
            let path = entry.path().map_err(|e| ReadError::from_stream(&section, e))?;
            path.to_str()
                .filter(|name| !name.is_empty() && !name.contains('/'))
                .map(str::to_string)
                .ok_or_else(|| {
                    ReadError::malformed(&section, format!("invalid payload file name {path:?}"))
                })?
        };
        let size = entry.size();
        let mtime = entry
            .header()
            .mtime()
            .map_err(|e| ReadError::from_stream(&section, e))?;

        if let Some(max) = ctx.max_files {
            if files.len() >= max {
                return Err(ReadError::malformed(
                    &section,
                    format!("payload carries more than {max} file(s)"),
                ));
            }
        }
        if !seen.insert(name.clone()) {
            return Err(ReadError::malformed(
                &section,
                format!("duplicate payload file {name}"),
            ));
        }
        if let Some(declared) = ctx.declared_files {
            if !declared.contains(&name) {
                return Err(ReadError::malformed(
                    &section,
                    format!("payload file {name} is not listed in the update header"),
                ));
            }
        }

        let manifest_path = data_path(ctx.index, &name);
        let expected = ctx.manifest.get(&manifest_path).ok_or_else(|| {
            ReadError::malformed(&section, format!("no checksum listed for {manifest_path}"))
        })?;

        let mut reader = HashingReader::new(entry, manifest_path.clone());
        reader
            .drain()
            .map_err(|e| ReadError::from_stream(&manifest_path, e))?;
        if reader.bytes_hashed() != size {
            return Err(ReadError::malformed(
                &manifest_path,
                format!("expected {size} bytes, read {}", reader.bytes_hashed()),
            ));
        }
        let digest = reader.finish_and_verify(expected)?;

        let modified = i64::try_from(mtime)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| {
                ReadError::malformed(&manifest_path, format!("modification time {mtime} out of range"))
            })?;

        files.push(FileEntry {
            name,
            size,
            modified,
            checksum: digest.to_hex(),
        });
    }

    let prefix = format!("{section}/");
    for path in ctx.manifest.data_files(ctx.index) {
        let name = path.strip_prefix(&prefix).unwrap_or(path);
        if !seen.contains(name) {
            return Err(ReadError::malformed(
                &section,
                format!("{path} is listed in the manifest but missing from the payload"),
            ));
        }
    }
    if let Some(declared) = ctx.declared_files {
        if let Some(missing) = declared.iter().find(|name| !seen.contains(name.as_str())) {
            return Err(ReadError::malformed(
                &section,
                format!("declared payload file {missing} is missing"),
            ));
        }
    }

    tracing::debug!(section = %section, files = files.len(), "Payload files verified");
    Ok(files)
}
