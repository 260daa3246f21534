//! Tracing subscriber setup.
//!
//! Console output goes to stderr. With `--log-file`, a plain-text copy is
//! written through a non-blocking appender; the returned guard must be kept
//! alive until exit or buffered lines are lost.

use std::path::Path;

use clap::ValueEnum;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::CliError;

/// Filter used when neither `--log-level` nor `RUST_LOG` is set.
pub const DEFAULT_FILTER: &str = "orbitstream=info";

/// Verbosity selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    /// Includes per-tick lock contention
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Filter directive scoped to this crate.
    pub fn directive(&self) -> String {
        format!("orbitstream={}", self.as_str())
    }
}

/// Resolve the filter: `--log-level`, then `RUST_LOG`, then the default.
fn build_filter(level: Option<LogLevel>) -> Result<EnvFilter, CliError> {
    match level {
        Some(level) => {
            EnvFilter::try_new(level.directive()).map_err(|e| CliError::Logging(e.to_string()))
        }
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// Install the global subscriber.
pub fn init(level: Option<LogLevel>, log_file: Option<&Path>) -> Result<Option<WorkerGuard>, CliError> {
    let filter = build_filter(level)?;

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty());
            let file_name = path
                .file_name()
                .ok_or_else(|| CliError::Config(format!("Invalid log file path: {}", path.display())))?;
            let appender =
                tracing_appender::rolling::never(directory.unwrap_or(Path::new(".")), file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))?;

    Ok(guard)
}
