//! JSON documents found in the container.
//!
//! The raw serde shapes are private. Callers get [`HeaderInfo`], which
//! presents the version 2 and version 3 layouts the same way, and
//! [`TypeInfo`], whose provides and depends stay as raw JSON so a handler
//! can reject them without failing the read.

use serde::Deserialize;
use serde_json::Value;

use crate::artifact::{ArtifactDepends, ArtifactInfo, ArtifactProvides};
use crate::error::ReadError;

/// The only container format this reader understands.
pub const ARTIFACT_FORMAT: &str = "mender";

/// Layout versions this reader understands.
pub const SUPPORTED_VERSIONS: [u64; 2] = [2, 3];

#[derive(Debug, Deserialize)]
struct VersionFile {
    format: String,
    version: u64,
}

/// Parse the `version` entry.
///
/// # Errors
///
/// `MalformedContainer` if the JSON does not decode, `UnsupportedVersion`
/// for any format other than `mender` or a version other than 2 or 3.
pub fn parse_version(raw: &[u8]) -> Result<ArtifactInfo, ReadError> {
    let file: VersionFile = serde_json::from_slice(raw)
        .map_err(|e| ReadError::malformed("version", e.to_string()))?;

    if file.format != ARTIFACT_FORMAT || !SUPPORTED_VERSIONS.contains(&file.version) {
        return Err(ReadError::UnsupportedVersion {
            format: file.format,
            version: file.version,
        });
    }

    Ok(ArtifactInfo {
        format: file.format,
        version: file.version,
    })
}

#[derive(Debug, Deserialize)]
struct PayloadType {
    #[serde(rename = "type")]
    update_type: String,
}

#[derive(Debug, Deserialize)]
struct HeaderInfoV2 {
    updates: Vec<PayloadType>,
    artifact_name: String,
    device_types_compatible: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ProvidesV3 {
    artifact_name: String,
    #[serde(default)]
    artifact_group: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DependsV3 {
    #[serde(default)]
    artifact_name: Vec<String>,
    device_type: Vec<String>,
    #[serde(default)]
    artifact_group: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct HeaderInfoV3 {
    payloads: Vec<PayloadType>,
    artifact_provides: ProvidesV3,
    artifact_depends: DependsV3,
}

/// Artifact-wide header, the same shape for every layout version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderInfo {
    pub name: String,
    pub compatible_devices: Vec<String>,
    /// Declared update type per payload index
    pub update_types: Vec<String>,
    pub provides: Option<ArtifactProvides>,
    pub depends: Option<ArtifactDepends>,
}

impl HeaderInfo {
    /// Parse `header-info` for the given layout version.
    pub fn parse(version: u64, raw: &[u8]) -> Result<Self, ReadError> {
        let malformed = |e: serde_json::Error| ReadError::malformed("header-info", e.to_string());

        let info = match version {
            2 => {
                let v2: HeaderInfoV2 = serde_json::from_slice(raw).map_err(malformed)?;
                HeaderInfo {
                    name: v2.artifact_name,
                    compatible_devices: v2.device_types_compatible,
                    update_types: v2.updates.into_iter().map(|p| p.update_type).collect(),
                    provides: None,
                    depends: None,
                }
            }
            _ => {
                let v3: HeaderInfoV3 = serde_json::from_slice(raw).map_err(malformed)?;
                HeaderInfo {
                    name: v3.artifact_provides.artifact_name.clone(),
                    compatible_devices: v3.artifact_depends.device_type.clone(),
                    update_types: v3.payloads.into_iter().map(|p| p.update_type).collect(),
                    provides: Some(ArtifactProvides {
                        artifact_name: v3.artifact_provides.artifact_name,
                        artifact_group: v3
                            .artifact_provides
                            .artifact_group
                            .filter(|group| !group.is_empty()),
                    }),
                    depends: Some(ArtifactDepends {
                        artifact_name: v3.artifact_depends.artifact_name,
                        device_type: v3.artifact_depends.device_type,
                        artifact_group: v3.artifact_depends.artifact_group,
                    }),
                }
            }
        };

        if info.name.is_empty() {
            return Err(ReadError::malformed("header-info", "artifact name is empty"));
        }
        if info.compatible_devices.is_empty() {
            return Err(ReadError::malformed(
                "header-info",
                "no compatible devices listed",
            ));
        }
        if let Some(empty) = info.update_types.iter().position(String::is_empty) {
            return Err(ReadError::malformed(
                "header-info",
                format!("payload {empty} has an empty update type"),
            ));
        }

        Ok(info)
    }
}

/// Per-payload `type-info`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TypeInfo {
    #[serde(rename = "type")]
    pub update_type: String,
    #[serde(default)]
    pub artifact_provides: Option<Value>,
    #[serde(default)]
    pub artifact_depends: Option<Value>,
    #[serde(default)]
    pub clears_artifact_provides: Option<Vec<String>>,
}

impl TypeInfo {
    pub fn parse(section: &str, raw: &[u8]) -> Result<Self, ReadError> {
        serde_json::from_slice(raw).map_err(|e| ReadError::malformed(section, e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct FilesList {
    files: Vec<String>,
}

/// Parse a version 2 `files` list.
pub fn parse_files_list(section: &str, raw: &[u8]) -> Result<Vec<String>, ReadError> {
    let list: FilesList =
        serde_json::from_slice(raw).map_err(|e| ReadError::malformed(section, e.to_string()))?;
    if list.files.iter().any(|name| name.is_empty() || name.contains('/')) {
        return Err(ReadError::malformed(section, "invalid payload file name"));
    }
    Ok(list.files)
}
