//! CLI command definitions and argument parsing

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use fwa_reader::ArtifactReader;

use crate::config::{CliOverrides, Config};
use crate::output::{OutputFormat, OutputFormatter};
use crate::ExitCode;

/// fwa - firmware update artifact tool
#[derive(Parser, Debug)]
#[command(name = "fwa")]
#[command(version, about = "Inspect and verify firmware update artifacts")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: text, json, quiet
    #[arg(long, global = true)]
    pub output: Option<OutputFormat>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug mode (per-section tracing)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true, env = "FWA_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Overrides this invocation applies on top of the config file
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            output_format: self.output.map(|format| format.to_string()),
            debug: self.debug.then_some(true),
            key_file: match &self.command {
                Commands::Read(args) => args.key.clone(),
            },
        }
    }

    /// Load the config file and apply this invocation's overrides.
    ///
    /// A config file that exists but cannot be used is an error, never a
    /// silent fallback to defaults, since it may carry the verification key.
    pub fn resolve_config(&self) -> anyhow::Result<Result<Config, ExitCode>> {
        match Config::load_from(self.config.as_deref()) {
            Ok(config) => Ok(Ok(config.with_overrides(&self.overrides()))),
            Err(e) => {
                let formatter = OutputFormatter::new(self.output.unwrap_or_default());
                let code = fail(&formatter, &e.to_string(), "config", ExitCode::InvalidParameters)?;
                Ok(Err(code))
            }
        }
    }

    /// Execute the CLI command with a pre-loaded configuration
    pub fn execute_with_config(self, config: Config) -> anyhow::Result<ExitCode> {
        let format = OutputFormat::from_str(&config.output.format).unwrap_or_default();
        let formatter = OutputFormatter::new(format);

        match self.command {
            Commands::Read(args) => args.execute(&config, &formatter),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read an artifact and print its contents
    Read(ReadArgs),
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Artifact file to read
    pub artifact: Option<PathBuf>,

    /// Public key file used to verify the artifact signature
    #[arg(short, long)]
    pub key: Option<PathBuf>,
}

impl ReadArgs {
    pub fn execute(self, config: &Config, formatter: &OutputFormatter) -> anyhow::Result<ExitCode> {
        let Some(path) = self.artifact else {
            return fail(
                formatter,
                "Nothing specified, nothing read. \nMaybe you wanted to say 'fwa read <pathspec>'?",
                "read",
                ExitCode::InvalidParameters,
            );
        };

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Open failed");
                return fail(
                    formatter,
                    &format!("Can not open artifact: {}", path.display()),
                    "read",
                    ExitCode::OpenFailed,
                );
            }
        };

        let reader = match ArtifactReader::from_config(&config.reader) {
            Ok(reader) => reader,
            Err(e) => return fail(formatter, &e.to_string(), "read", ExitCode::InvalidParameters),
        };

        let artifact = match reader.read(BufReader::new(file)) {
            Ok(artifact) => artifact,
            Err(e) => return fail(formatter, &e.to_string(), "read", ExitCode::ReadFailed),
        };

        let output = formatter.format_artifact(&artifact);
        if !output.is_empty() {
            write_line(io::stdout().lock(), &output)?;
        }
        Ok(ExitCode::Success)
    }
}

/// Print `message` in the active format and hand back `code`.
fn fail(
    formatter: &OutputFormatter,
    message: &str,
    command: &str,
    code: ExitCode,
) -> anyhow::Result<ExitCode> {
    let output = formatter.format_error(message, command, code);
    match formatter.format() {
        OutputFormat::Json => write_line(io::stdout().lock(), &output)?,
        OutputFormat::Text => eprintln!("{output}"),
        OutputFormat::Quiet => {}
    }
    Ok(code)
}

fn write_line(mut out: impl Write, output: &str) -> anyhow::Result<()> {
    writeln!(out, "{output}")
        .and_then(|()| out.flush())
        .context("Failed to write to stdout")
}
