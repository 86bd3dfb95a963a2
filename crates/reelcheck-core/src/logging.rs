//! Leveled log sinks for a run.
//!
//! Three outputs share one `tracing` registry, each with its own filter:
//!
//! | Sink | Level |
//! |------|-------|
//! | `<log_dir>/test_execution.log` | everything (noisy HTTP internals capped at INFO) |
//! | `<log_dir>/errors.log` | ERROR only |
//! | console (stderr, colorized) | INFO by default, `RUST_LOG` overrides |

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::filter::{EnvFilter, LevelFilter, Targets};
use tracing_subscriber::prelude::*;

pub const EXECUTION_LOG: &str = "test_execution.log";
pub const ERROR_LOG: &str = "errors.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log file {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a global logger is already installed")]
    AlreadyInstalled,
}

/// How chatty the console and terminal reporter are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Warnings and errors only.
    Quiet,
    #[default]
    Normal,
    /// Adds DEBUG.
    Verbose,
}

impl Verbosity {
    fn default_directive(self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
        }
    }
}

/// Where the log files ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFiles {
    pub execution: PathBuf,
    pub errors: PathBuf,
}

fn create(path: &Path) -> Result<File, LoggingError> {
    File::create(path).map_err(|source| LoggingError::Create {
        path: path.to_path_buf(),
        source,
    })
}

/// Builds the subscriber without installing it. Log files are truncated.
pub fn build_subscriber(
    log_dir: &Path,
    console: Option<Verbosity>,
) -> Result<(impl Subscriber + Send + Sync + 'static, LogFiles), LoggingError> {
    fs::create_dir_all(log_dir).map_err(|source| LoggingError::Create {
        path: log_dir.to_path_buf(),
        source,
    })?;
    let files = LogFiles {
        execution: log_dir.join(EXECUTION_LOG),
        errors: log_dir.join(ERROR_LOG),
    };

    let execution_filter = Targets::new()
        .with_default(LevelFilter::TRACE)
        .with_target("hyper", LevelFilter::INFO)
        .with_target("hyper_util", LevelFilter::INFO)
        .with_target("reqwest", LevelFilter::INFO)
        .with_target("h2", LevelFilter::INFO)
        .with_target("rustls", LevelFilter::INFO);
    let execution = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(create(&files.execution)?))
        .with_ansi(false)
        .with_target(true)
        .with_filter(execution_filter);

    let errors = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(create(&files.errors)?))
        .with_ansi(false)
        .with_filter(LevelFilter::ERROR);

    let console = console.map(|verbosity| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(verbosity.default_directive()));
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false)
            .compact()
            .with_filter(filter)
    });

    let subscriber = tracing_subscriber::registry()
        .with(execution)
        .with(errors)
        .with(console);
    Ok((subscriber, files))
}

/// Installs the run's logging as the global default.
pub fn init(log_dir: &Path, console: Verbosity) -> Result<LogFiles, LoggingError> {
    let (subscriber, files) = build_subscriber(log_dir, Some(console))?;
    subscriber
        .try_init()
        .map_err(|_| LoggingError::AlreadyInstalled)?;
    Ok(files)
}
