//! Tracing setup for cellbench
//!
//! Console logs go to stderr at the user's level so the report on stdout stays
//! clean. When a log directory is given, every event down to TRACE is also
//! written to `cellbench-last-run.log` in that directory.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name of the full trace log, overwritten on every run.
pub const LOG_FILE_NAME: &str = "cellbench-last-run.log";

/// Initialize tracing with console output and an optional full trace file.
///
/// `RUST_LOG` takes precedence over `console_level` for the console layer.
/// Returns the path of the trace file when one was opened.
///
/// # Errors
///
/// - `Box<dyn std::error::Error>` - Log directory or file cannot be created, or a global subscriber is already installed
pub fn init_tracing(
    console_level: Level,
    logs_dir: Option<&Path>,
) -> Result<Option<PathBuf>, Box<dyn std::error::Error>> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter);

    let (file_layer, log_file_path) = match logs_dir {
        Some(dir) => {
            create_dir_all(dir)?;
            let path = dir.join(LOG_FILE_NAME);
            let log_file = File::create(&path)?;

            let layer = fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(log_file)
                .with_filter(EnvFilter::new("trace"));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    match &log_file_path {
        Some(path) => tracing::info!(
            "Tracing initialized: console={}, trace_file={}",
            console_level,
            path.display()
        ),
        None => tracing::info!("Tracing initialized: console={}", console_level),
    }

    Ok(log_file_path)
}

/// Console verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    /// Includes one line per packet event
    Trace,
}

impl From<CliLogLevel> for Level {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}
