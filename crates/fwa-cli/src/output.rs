//! Output formatting for CLI results
//!
//! This module provides consistent output formatting for the `read` report.
//! It supports three output formats:
//! - Text: Human-readable report (default)
//! - JSON: Structured JSON for scripting and automation
//! - Quiet: Minimal output, exit codes only

use std::fmt::{self, Write as _};
use std::str::FromStr;

use comfy_table::{presets::UTF8_FULL, Table};
use fwa_reader::{Artifact, FileEntry, SectionValue, SignatureStatus};
use serde::Serialize;

use crate::ExitCode;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable report
    #[default]
    Text,
    /// JSON format for scripting
    Json,
    /// Minimal output - exit codes only
    Quiet,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "quiet" => Ok(Self::Quiet),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
            Self::Quiet => write!(f, "quiet"),
        }
    }
}

/// Standard JSON response wrapper for consistent schema
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    /// Whether the operation was successful
    pub success: bool,
    /// The response data (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Process exit status (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<ExitStatus>,
    /// ISO 8601 timestamp
    pub timestamp: String,
    /// Command that was executed
    pub command: String,
}

impl<T: Serialize> JsonResponse<T> {
    /// Create a successful response
    pub fn success(data: T, command: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            exit_code: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: command.to_string(),
        }
    }
}

impl JsonResponse<()> {
    /// Create an error response
    pub fn error(message: &str, command: &str, code: ExitCode) -> JsonResponse<()> {
        JsonResponse {
            success: false,
            data: None,
            error: Some(message.to_string()),
            exit_code: Some(ExitStatus::from(code)),
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: command.to_string(),
        }
    }
}

/// Exit code as reported in JSON output
#[derive(Debug, Serialize)]
pub struct ExitStatus {
    pub code: i32,
    pub name: &'static str,
    pub description: &'static str,
}

impl From<ExitCode> for ExitStatus {
    fn from(code: ExitCode) -> Self {
        Self {
            code: code.into(),
            name: code.name(),
            description: code.description(),
        }
    }
}

/// Formats output for different modes
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Get the current output format
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.format == OutputFormat::Quiet
    }

    /// Format a successfully read artifact
    pub fn format_artifact(&self, artifact: &Artifact) -> String {
        match self.format {
            OutputFormat::Text => ArtifactReport::new(artifact).to_string(),
            OutputFormat::Json => to_json(&JsonResponse::success(artifact, "read")),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format a command failure
    pub fn format_error(&self, message: &str, command: &str, code: ExitCode) -> String {
        match self.format {
            OutputFormat::Text => format!("Error: {message}"),
            OutputFormat::Json => to_json(&JsonResponse::error(message, command, code)),
            OutputFormat::Quiet => String::new(),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        format!(r#"{{"success":false,"error":"Serialization error: {e}"}}"#)
    })
}

/// One-line description of a signature check outcome
pub fn signature_line(status: SignatureStatus) -> &'static str {
    match status {
        SignatureStatus::Unsigned => "no signature",
        SignatureStatus::NoKeyProvided => {
            "signed but no key for verification provided; \
             please use `-k` option for providing verification key"
        }
        SignatureStatus::Verified => "signed and verified correctly",
        SignatureStatus::VerificationFailed => "signed; verification using provided key failed",
    }
}

/// Human-readable report of an artifact's contents
pub struct ArtifactReport<'a> {
    artifact: &'a Artifact,
}

impl<'a> ArtifactReport<'a> {
    pub fn new(artifact: &'a Artifact) -> Self {
        Self { artifact }
    }

    fn write_header(&self, out: &mut String) -> fmt::Result {
        let artifact = self.artifact;
        writeln!(out, "Mender artifact:")?;
        writeln!(out, "  Name: {}", artifact.name)?;
        writeln!(out, "  Format: {}", artifact.info.format)?;
        writeln!(out, "  Version: {}", artifact.info.version)?;
        writeln!(out, "  Signature: {}", signature_line(artifact.signature))?;
        writeln!(out, "  Compatible devices: '[{}]'", artifact.compatible_devices.join(" "))?;

        if let Some(provides) = &artifact.provides {
            writeln!(
                out,
                "  Provides group: {}",
                provides.artifact_group.as_deref().unwrap_or_default()
            )?;
        }
        if let Some(depends) = &artifact.depends {
            writeln!(
                out,
                "  Depends on one of artifact(s): [{}]",
                depends.artifact_name.join(", ")
            )?;
            writeln!(
                out,
                "  Depends on one of group(s): [{}]",
                depends.artifact_group.join(", ")
            )?;
        }

        writeln!(out, "  State scripts:")?;
        for script in &artifact.scripts {
            writeln!(out, "    {script}")?;
        }
        Ok(())
    }

    fn write_updates(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "\nUpdates:")?;
        for (index, update) in self.artifact.updates.iter().enumerate() {
            writeln!(out, "  {index:>3}:")?;
            writeln!(out, "    Type:   {}", update.update_type)?;

            write_section(out, "Provides", "provides", &update.provides, |out, provides| {
                for (key, value) in provides {
                    writeln!(out, "\t{key}: {value}")?;
                }
                Ok(())
            })?;

            write_section(out, "Depends", "depends", &update.depends, |out, depends| {
                for (key, values) in depends {
                    writeln!(out, "\t{key}: [{}]", values.join(", "))?;
                }
                Ok(())
            })?;

            if !update.clears_provides.is_empty() {
                writeln!(out, "    Clears Provides: [{}]", update.clears_provides.join(", "))?;
            }

            write_section(out, "Metadata", "metadata", &update.meta_data, |out, meta_data| {
                match serde_json::to_string_pretty(meta_data) {
                    Ok(pretty) => writeln!(out, "\t{}", pretty.replace('\n', "\n\t")),
                    Err(e) => writeln!(out, "\tInvalid metadata section: {e}"),
                }
            })?;

            if update.files.is_empty() {
                writeln!(out, "    Files: Nothing")?;
            } else {
                writeln!(out, "    Files:")?;
                for line in files_table(&update.files).to_string().lines() {
                    writeln!(out, "      {line}")?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for ArtifactReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_header(&mut out)?;
        self.write_updates(&mut out)?;
        f.write_str(out.trim_end_matches('\n'))
    }
}

/// Write `label:` followed by the section body, `Nothing`, or the decode error.
fn write_section<T, F>(
    out: &mut String,
    label: &str,
    section: &str,
    value: &SectionValue<T>,
    body: F,
) -> fmt::Result
where
    T: SectionLen,
    F: FnOnce(&mut String, &T) -> fmt::Result,
{
    write!(out, "    {label}:")?;
    match value {
        SectionValue::Invalid(err) => writeln!(out, " Invalid {section} section: {}", err.reason),
        SectionValue::Valid(value) if !value.is_empty_section() => {
            writeln!(out)?;
            body(out, value)
        }
        _ => writeln!(out, " Nothing"),
    }
}

trait SectionLen {
    fn is_empty_section(&self) -> bool;
}

impl<K, V> SectionLen for std::collections::BTreeMap<K, V> {
    fn is_empty_section(&self) -> bool {
        self.is_empty()
    }
}

impl SectionLen for serde_json::Map<String, serde_json::Value> {
    fn is_empty_section(&self) -> bool {
        self.is_empty()
    }
}

fn files_table(files: &[FileEntry]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Name", "Size", "Modified", "Checksum"]);
    for file in files {
        table.add_row(vec![
            file.name.clone(),
            file.size.to_string(),
            file.modified.to_rfc3339(),
            file.checksum.clone(),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use fwa_reader::{
        ArtifactDepends, ArtifactInfo, ArtifactProvides, SectionError, SectionKind, Update,
    };
    use std::collections::BTreeMap;

    fn sample_artifact() -> Artifact {
        let mut provides = BTreeMap::new();
        provides.insert("rootfs-image.version".to_string(), "release-1".to_string());

        let mut meta_data = serde_json::Map::new();
        meta_data.insert("dest_dir".to_string(), serde_json::json!("/opt/app"));

        Artifact {
            name: "release-1".to_string(),
            info: ArtifactInfo {
                format: "mender".to_string(),
                version: 3,
            },
            compatible_devices: vec!["qemux86-64".to_string(), "raspberrypi4".to_string()],
            provides: Some(ArtifactProvides {
                artifact_name: "release-1".to_string(),
                artifact_group: Some("stable".to_string()),
            }),
            depends: Some(ArtifactDepends {
                artifact_name: vec!["release-0".to_string()],
                device_type: vec!["qemux86-64".to_string()],
                artifact_group: Vec::new(),
            }),
            signature: SignatureStatus::Verified,
            updates: vec![Update {
                update_type: "rootfs-image".to_string(),
                provides: SectionValue::Valid(provides),
                depends: SectionValue::Invalid(SectionError::new(
                    SectionKind::Depends,
                    "expected an object, found number",
                )),
                clears_provides: vec!["rootfs-image.*".to_string()],
                meta_data: SectionValue::Valid(meta_data),
                files: vec![FileEntry {
                    name: "rootfs.img".to_string(),
                    size: 1_048_576,
                    modified: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
                    checksum: "ab".repeat(32),
                }],
            }],
            scripts: vec!["ArtifactInstall_Enter_00".to_string()],
        }
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!(OutputFormat::from_str("text").unwrap(), OutputFormat::Text);
        assert_eq!(OutputFormat::from_str("json").unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::from_str("quiet").unwrap(), OutputFormat::Quiet);
        assert_eq!(OutputFormat::from_str("JSON").unwrap(), OutputFormat::Json);
        assert!(OutputFormat::from_str("table").is_err());
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(OutputFormat::Text.to_string(), "text");
        assert_eq!(OutputFormat::Json.to_string(), "json");
        assert_eq!(OutputFormat::Quiet.to_string(), "quiet");
    }

    #[test]
    fn test_signature_lines() {
        assert_eq!(signature_line(SignatureStatus::Unsigned), "no signature");
        assert_eq!(
            signature_line(SignatureStatus::NoKeyProvided),
            "signed but no key for verification provided; \
             please use `-k` option for providing verification key"
        );
        assert_eq!(
            signature_line(SignatureStatus::Verified),
            "signed and verified correctly"
        );
        assert_eq!(
            signature_line(SignatureStatus::VerificationFailed),
            "signed; verification using provided key failed"
        );
    }

    #[test]
    fn test_text_report_header() {
        let report = ArtifactReport::new(&sample_artifact()).to_string();

        assert!(report.starts_with("Mender artifact:\n  Name: release-1\n"));
        assert!(report.contains("  Format: mender\n"));
        assert!(report.contains("  Version: 3\n"));
        assert!(report.contains("  Signature: signed and verified correctly\n"));
        assert!(report.contains("  Compatible devices: '[qemux86-64 raspberrypi4]'\n"));
        assert!(report.contains("  Provides group: stable\n"));
        assert!(report.contains("  Depends on one of artifact(s): [release-0]\n"));
        assert!(report.contains("  Depends on one of group(s): []\n"));
        assert!(report.contains("  State scripts:\n    ArtifactInstall_Enter_00\n"));
    }

    #[test]
    fn test_text_report_updates() {
        let report = ArtifactReport::new(&sample_artifact()).to_string();

        assert!(report.contains("\nUpdates:\n    0:\n    Type:   rootfs-image\n"));
        assert!(report.contains("    Provides:\n\trootfs-image.version: release-1\n"));
        assert!(report.contains(
            "    Depends: Invalid depends section: expected an object, found number\n"
        ));
        assert!(report.contains("    Clears Provides: [rootfs-image.*]\n"));
        assert!(report.contains("    Metadata:\n\t{\n\t  \"dest_dir\": \"/opt/app\"\n\t}\n"));
        assert!(report.contains("    Files:\n"));
        assert!(report.contains("rootfs.img"));
        assert!(report.contains("1048576"));
        assert!(report.contains(&"ab".repeat(32)));
    }

    #[test]
    fn test_text_report_empty_sections() {
        let mut artifact = sample_artifact();
        artifact.provides = None;
        artifact.depends = None;
        artifact.signature = SignatureStatus::Unsigned;
        artifact.scripts.clear();
        let update = &mut artifact.updates[0];
        update.provides = SectionValue::Valid(BTreeMap::new());
        update.depends = SectionValue::Absent;
        update.meta_data = SectionValue::Absent;
        update.clears_provides.clear();
        update.files.clear();

        let report = ArtifactReport::new(&artifact).to_string();
        assert!(report.contains("  Signature: no signature\n"));
        assert!(!report.contains("Provides group"));
        assert!(!report.contains("Depends on one of"));
        assert!(report.contains("    Provides: Nothing\n"));
        assert!(report.contains("    Depends: Nothing\n"));
        assert!(report.contains("    Metadata: Nothing\n"));
        assert!(!report.contains("Clears Provides"));
        assert!(report.ends_with("    Files: Nothing"));
    }

    #[test]
    fn test_json_output() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format_artifact(&sample_artifact());

        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["command"], "read");
        assert_eq!(value["data"]["name"], "release-1");
        assert_eq!(value["data"]["signature"], serde_json::json!("verified"));
        assert_eq!(value["data"]["updates"][0]["depends"]["status"], "invalid");
        assert_eq!(value["data"]["updates"][0]["files"][0]["size"], 1_048_576);
    }

    #[test]
    fn test_json_error_output() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format_error(
            "Can not open artifact: missing.mender",
            "read",
            ExitCode::OpenFailed,
        );

        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Can not open artifact: missing.mender");
        assert_eq!(value["exit_code"]["code"], 3);
        assert_eq!(value["exit_code"]["name"], "OPEN_FAILED");
        assert_eq!(
            value["exit_code"]["description"],
            ExitCode::OpenFailed.description()
        );
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_formatter_quiet_mode() {
        let formatter = OutputFormatter::new(OutputFormat::Quiet);
        assert!(formatter.is_quiet());
        assert!(formatter.format_artifact(&sample_artifact()).is_empty());
        assert!(formatter
            .format_error("boom", "read", ExitCode::ReadFailed)
            .is_empty());
    }
}
