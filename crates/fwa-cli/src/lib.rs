//! fwa - CLI for firmware update artifacts
//!
//! This crate provides a command-line interface for:
//! - Reading an artifact container and printing its contents
//! - Verifying payload checksums while the artifact streams
//! - Checking the manifest signature against a verification key

pub mod cli;
pub mod config;
pub mod output;

pub use cli::Cli;
pub use config::{CliOverrides, Config};
pub use output::{ArtifactReport, ExitStatus, OutputFormat, OutputFormatter};

/// Exit codes for CLI operations
///
/// Exit codes provide machine-readable status for scripting and automation:
/// - 0: Success - artifact read and printed
/// - 1: General error - unspecified error occurred
/// - 2: Invalid parameters - missing argument, unusable config file or verification key
/// - 3: Open failed - the artifact file could not be opened
/// - 4: Read failed - the artifact is malformed, unsupported or corrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Operation completed successfully (exit code 0)
    Success = 0,
    /// General error (exit code 1)
    GeneralError = 1,
    /// Invalid parameters (exit code 2)
    InvalidParameters = 2,
    /// Artifact could not be opened (exit code 3)
    OpenFailed = 3,
    /// Artifact could not be read (exit code 4)
    ReadFailed = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    /// Get the exit code name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::InvalidParameters => "INVALID_PARAMETERS",
            ExitCode::OpenFailed => "OPEN_FAILED",
            ExitCode::ReadFailed => "READ_FAILED",
        }
    }

    /// Get a human-readable description of the exit code
    pub fn description(&self) -> &'static str {
        match self {
            ExitCode::Success => "Operation completed successfully",
            ExitCode::GeneralError => "An unspecified error occurred",
            ExitCode::InvalidParameters => "Missing argument, unusable config file or invalid verification key",
            ExitCode::OpenFailed => "Could not open the artifact file",
            ExitCode::ReadFailed => "The artifact could not be read or verified",
        }
    }
}

#[cfg(test)]
mod exit_code_tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success as i32, 0);
        assert_eq!(ExitCode::GeneralError as i32, 1);
        assert_eq!(ExitCode::InvalidParameters as i32, 2);
        assert_eq!(ExitCode::OpenFailed as i32, 3);
        assert_eq!(ExitCode::ReadFailed as i32, 4);
    }

    #[test]
    fn test_exit_code_from_i32() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::InvalidParameters), 2);
        assert_eq!(i32::from(ExitCode::ReadFailed), 4);
    }

    #[test]
    fn test_exit_code_names() {
        assert_eq!(ExitCode::Success.name(), "SUCCESS");
        assert_eq!(ExitCode::GeneralError.name(), "GENERAL_ERROR");
        assert_eq!(ExitCode::InvalidParameters.name(), "INVALID_PARAMETERS");
        assert_eq!(ExitCode::OpenFailed.name(), "OPEN_FAILED");
        assert_eq!(ExitCode::ReadFailed.name(), "READ_FAILED");
    }

    #[test]
    fn test_exit_code_descriptions() {
        for code in [
            ExitCode::Success,
            ExitCode::GeneralError,
            ExitCode::InvalidParameters,
            ExitCode::OpenFailed,
            ExitCode::ReadFailed,
        ] {
            assert!(!code.description().is_empty());
        }
    }

    #[test]
    fn test_exit_code_to_process_exit_code() {
        let _ = ExitCode::Success.to_exit_code();
        let _ = ExitCode::ReadFailed.to_exit_code();
    }
}
