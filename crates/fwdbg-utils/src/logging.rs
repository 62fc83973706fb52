//! # Logging Utilities
//!
//! Logging infrastructure for the fwdbg tools using `tracing`.
//!
//! Logs always go to stderr: `fwdbg inspect` prints its tables on stdout and
//! build scripts often capture it. Supported features:
//! - Multiple output formats (JSON for CI, pretty for development)
//! - Environment variable configuration
//! - Log level filtering
//! - Optional file output alongside the console
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fwdbg_utils::init_logging;
//!
//! // Keep the guard alive until the program exits, or buffered file logs are lost.
//! let _guard = init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level filter (e.g., `RUST_LOG=debug`, `RUST_LOG=fwdbg_core=trace`)
//! - `FWDBG_LOG_FORMAT`: Set output format (`json` or `pretty`, default: `pretty`)
//! - `FWDBG_LOG_FILE`: Optional path to log file or directory (if not set, logs only to stderr)

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fs, io};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "FWDBG_LOG_FORMAT";

/// Environment variable naming an additional log file.
pub const LOG_FILE_ENV: &str = "FWDBG_LOG_FILE";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default for development)
    Pretty,
    /// JSON format, one object per line (for CI log collectors)
    Json,
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "ci" | "prod" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {s}. Use 'pretty' or 'json'")),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    Info,
    /// Debug level
    Debug,
    /// Trace level (most verbose)
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Unknown log level: {s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            )),
        }
    }
}

/// Keeps the background file writer alive.
///
/// Dropping it flushes pending file output; hold it for the life of the
/// program. Console-only logging carries no writer and the guard is inert.
#[derive(Debug, Default)]
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard
{
    _file_writer: Option<WorkerGuard>,
}

/// Initialize logging with default settings
///
/// Reads configuration from environment variables:
/// - `RUST_LOG`: Log level filter (e.g., `debug`, `fwdbg_core=debug`)
/// - `FWDBG_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
/// - `FWDBG_LOG_FILE`: Optional path to log file
///
/// ## Errors
///
/// Returns an error if:
/// - Logging is already initialized
/// - `FWDBG_LOG_FORMAT` holds an unknown format
/// - `RUST_LOG` cannot be parsed
/// - `FWDBG_LOG_FILE` cannot be created
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    let format = match env::var(LOG_FORMAT_ENV) {
        Ok(value) => LogFormat::from_str(&value).map_err(LoggingError::InvalidFormat)?,
        Err(_) => LogFormat::Pretty,
    };

    init_logging_internal(format, None)
}

/// Initialize logging with an explicit format and an optional explicit level
///
/// An explicit level (from `--log-level`) takes precedence over `RUST_LOG`;
/// without one, `RUST_LOG` is honoured and `info` is the fallback.
///
/// ## Example
///
/// ```rust,no_run
/// use fwdbg_utils::{LogFormat, LogLevel, init_logging_with_level};
///
/// let _guard = init_logging_with_level(Some(LogLevel::Debug), LogFormat::Pretty)
///     .expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// Returns an error if logging is already initialized, if `RUST_LOG` is
/// consulted and cannot be parsed, or if the log file cannot be created.
pub fn init_logging_with_level(level: Option<LogLevel>, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    init_logging_internal(format, level.map(Into::into))
}

/// Resolve the filter directives once for all layers
///
/// Priority:
/// 1. `explicit_level` (from the `--log-level` CLI flag)
/// 2. `RUST_LOG` (supports module-specific filters like `fwdbg_core=debug`)
/// 3. `INFO`
fn filter_directives(explicit_level: Option<Level>) -> Result<String, LoggingError>
{
    if let Some(level) = explicit_level {
        return Ok(level.to_string());
    }
    match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(spec) if !spec.trim().is_empty() => {
            parse_filter(&spec)?;
            Ok(spec)
        }
        _ => Ok(Level::INFO.to_string()),
    }
}

fn parse_filter(spec: &str) -> Result<EnvFilter, LoggingError>
{
    EnvFilter::try_new(spec).map_err(|err| LoggingError::InvalidLevel(format!("{spec}: {err}")))
}

/// Split a log file path into the directory and file name `tracing-appender` wants.
///
/// A path naming an existing directory gets a dated file inside it.
fn split_log_path(path: &Path) -> (PathBuf, PathBuf)
{
    if path.is_dir() {
        let today = Utc::now().format("%Y-%m-%d");
        return (path.to_path_buf(), PathBuf::from(format!("{today}-fwdbg.log")));
    }

    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let file_name = path.file_name().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("fwdbg.log"));
    (directory, file_name)
}

/// Open (or create) the log file behind `path`.
///
/// One file per run is enough for a build step; there is no rotation.
fn open_log_file(path: &Path) -> Result<RollingFileAppender, LoggingError>
{
    let (directory, file_name) = split_log_path(path);
    fs::create_dir_all(&directory)?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy().into_owned())
        .build(&directory)
        .map_err(|err| LoggingError::FileError(io::Error::other(err)))
}

/// Internal initialization function
fn init_logging_internal(format: LogFormat, explicit_level: Option<Level>) -> Result<LoggingGuard, LoggingError>
{
    let directives = filter_directives(explicit_level)?;
    let build_filter = || EnvFilter::new(&directives);

    // Check if file logging is requested
    let (file_writer, guard) = match env::var(LOG_FILE_ENV).ok().map(PathBuf::from) {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(open_log_file(&path)?);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let result = match format {
        LogFormat::Pretty => {
            let console_layer = fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(true)
                .with_writer(io::stderr)
                .with_filter(build_filter());

            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false) // No ANSI in files
                    .with_filter(build_filter())
            });

            Registry::default().with(console_layer).with(file_layer).try_init()
        }
        LogFormat::Json => {
            let console_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(io::stderr)
                .with_filter(build_filter());

            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_filter(build_filter())
            });

            Registry::default().with(console_layer).with(file_layer).try_init()
        }
    };

    result.map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;
    Ok(LoggingGuard { _file_writer: guard })
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("json").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("dev").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("CI").unwrap(), LogFormat::Json);
        assert!(LogFormat::from_str("invalid").is_err());
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!(LogLevel::from_str("error").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::from_str("warn").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("debug").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert!(LogLevel::from_str("invalid").is_err());
    }

    #[test]
    fn test_log_level_to_tracing_level()
    {
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(LogLevel::Info), Level::INFO);
        assert_eq!(Level::from(LogLevel::Debug), Level::DEBUG);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }

    #[test]
    fn test_split_log_path()
    {
        let (dir, name) = split_log_path(Path::new("build/logs/fwdbg.log"));
        assert_eq!(dir, PathBuf::from("build/logs"));
        assert_eq!(name, PathBuf::from("fwdbg.log"));

        let (dir, name) = split_log_path(Path::new("gen.log"));
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, PathBuf::from("gen.log"));
    }

    #[test]
    fn test_parse_filter()
    {
        assert!(parse_filter("fwdbg_core=debug,warn").is_ok());
        let err = parse_filter("fwdbg_core=verbose").unwrap_err();
        assert!(matches!(err, LoggingError::InvalidLevel(_)));
    }

    #[test]
    fn test_explicit_level_skips_rust_log()
    {
        assert_eq!(filter_directives(Some(Level::DEBUG)).unwrap(), "DEBUG");
    }

    #[test]
    fn test_log_file_under_regular_file_fails()
    {
        let blocker = env::temp_dir().join(format!("fwdbg-log-blocker-{}", std::process::id()));
        fs::write(&blocker, b"not a directory").unwrap();

        let result = open_log_file(&blocker.join("logs").join("fwdbg.log"));
        fs::remove_file(&blocker).unwrap();

        assert!(matches!(result, Err(LoggingError::FileError(_))));
    }

    #[test]
    fn test_split_log_path_directory()
    {
        let temp = env::temp_dir();
        let (dir, name) = split_log_path(&temp);
        assert_eq!(dir, temp);
        let name = name.to_string_lossy().into_owned();
        assert!(name.ends_with("-fwdbg.log"));
        assert_eq!(name.len(), "YYYY-MM-DD-fwdbg.log".len());
    }
}
