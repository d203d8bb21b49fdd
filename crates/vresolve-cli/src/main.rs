//! # vresolve
//!
//! Resolves a base build recipe and its deployment variant overlays into a
//! single deterministic plan and runtime contract.

mod commands;
mod output;

use std::process::ExitCode;

use clap::Parser;
use vresolve_plan::ResolveError;

use crate::commands::{Cli, LogFormat};

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Conflicts exit 1; argument, dependency, input and usage errors exit 2.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<ResolveError>()
        .map_or(2, ResolveError::exit_code)
}

#[allow(clippy::print_stderr)]
fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match commands::execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}
