//! The artifact data model.
//!
//! An [`Artifact`] is built once per read and is plain data afterwards: it
//! owns every update and file entry and holds no reference to the stream it
//! came from. All maps are ordered so two reads of the same bytes compare
//! equal.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SectionError;
use crate::signature::SignatureStatus;

/// Format identifier and layout version from the `version` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactInfo {
    pub format: String,
    pub version: u64,
}

/// What installing this artifact provides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactProvides {
    pub artifact_name: String,
    pub artifact_group: Option<String>,
}

/// What must already be installed for this artifact to apply.
///
/// Each list is a set of acceptable values; an empty list places no
/// constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactDepends {
    pub artifact_name: Vec<String>,
    pub device_type: Vec<String>,
    pub artifact_group: Vec<String>,
}

/// A per-update section that may be missing, usable, or undecodable.
///
/// Decode failures are kept here instead of aborting the read, so a report
/// can show the problem next to everything that did decode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum SectionValue<T> {
    Absent,
    Valid(T),
    Invalid(SectionError),
}

impl<T> SectionValue<T> {
    pub fn from_result(result: Result<T, SectionError>) -> Self {
        match result {
            Ok(value) => SectionValue::Valid(value),
            Err(err) => SectionValue::Invalid(err),
        }
    }

    pub fn valid(&self) -> Option<&T> {
        match self {
            SectionValue::Valid(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&SectionError> {
        match self {
            SectionValue::Invalid(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, SectionValue::Absent)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, SectionValue::Invalid(_))
    }
}

impl<T> Default for SectionValue<T> {
    fn default() -> Self {
        SectionValue::Absent
    }
}

/// Per-update provides: name to value.
pub type UpdateProvides = BTreeMap<String, String>;

/// Per-update depends: name to the set of acceptable values.
pub type UpdateDepends = BTreeMap<String, Vec<String>>;

/// Free-form per-update metadata, always a JSON object.
pub type MetaData = serde_json::Map<String, serde_json::Value>;

/// One payload file, checked against the manifest while it streamed past.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// Lowercase hex SHA-256 of the file content
    pub checksum: String,
}

/// One payload of the artifact, in container order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Update {
    pub update_type: String,
    pub provides: SectionValue<UpdateProvides>,
    pub depends: SectionValue<UpdateDepends>,
    /// Provides keys this update removes from the device, in declared order
    pub clears_provides: Vec<String>,
    pub meta_data: SectionValue<MetaData>,
    pub files: Vec<FileEntry>,
}

/// A fully read and checked artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub name: String,
    pub info: ArtifactInfo,
    pub compatible_devices: Vec<String>,
    /// Artifact-level provides; absent for version 2 artifacts
    pub provides: Option<ArtifactProvides>,
    /// Artifact-level depends; absent for version 2 artifacts
    pub depends: Option<ArtifactDepends>,
    pub signature: SignatureStatus,
    pub updates: Vec<Update>,
    /// State script names in container order
    pub scripts: Vec<String>,
}

impl Artifact {
    /// Total payload bytes across all updates.
    pub fn payload_size(&self) -> u64 {
        self.updates
            .iter()
            .flat_map(|update| update.files.iter())
            .map(|file| file.size)
            .sum()
    }

    /// Whether any update carries an undecodable section.
    pub fn has_invalid_sections(&self) -> bool {
        self.updates.iter().any(|update| {
            update.provides.is_invalid() || update.depends.is_invalid() || update.meta_data.is_invalid()
        })
    }
}
