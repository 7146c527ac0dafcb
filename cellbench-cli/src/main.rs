//! Cellbench CLI - Command-line interface
//!
//! Runs harness scenarios and prints their latency and throughput report.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use cellbench_core::tracing_setup::{CliLogLevel, init_tracing};
use clap::Parser;

#[derive(Parser)]
#[command(name = "cellbench")]
#[command(about = "Latency and throughput harness for simulated cellular data paths")]
#[command(version)]
struct Cli {
    /// Console log level (RUST_LOG takes precedence)
    #[arg(long, global = true, value_enum, default_value_t = CliLogLevel::Warn)]
    log_level: CliLogLevel,

    /// Directory for the full trace log of this run
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(error) = init_tracing(cli.log_level.into(), cli.log_dir.as_deref()) {
        eprintln!("Warning: failed to initialize logging: {error}");
    }

    match commands::handle_command(cli.command).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
