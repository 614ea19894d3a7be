//! fwa CLI entry point

use clap::Parser;
use fwa_cli::{Cli, ExitCode};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> std::process::ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load config from custom path or default, with CLI overrides applied
    let config = match cli.resolve_config() {
        Ok(Ok(config)) => config,
        Ok(Err(code)) => return code.to_exit_code(),
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::GeneralError.to_exit_code();
        }
    };

    // Initialize logging based on config (with CLI override)
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.execute_with_config(config) {
        Ok(code) => code.to_exit_code(),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::GeneralError.to_exit_code()
        }
    }
}
