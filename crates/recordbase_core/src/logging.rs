//! Process-wide logging for the record engine.
//!
//! # Responsibility
//! - Start one rolling-file logger per process through `flexi_logger`.
//! - Route panics into the same log stream.
//!
//! # Invariants
//! - A second start with the same directory and level is a no-op; any other
//!   combination is rejected.
//! - Starting never panics.
//! - Messages follow `event=<name> module=<area> status=<..> key=value` and
//!   carry ids, counts and durations, never record data.

use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Once;

const LOG_FILE_BASENAME: &str = "recordbase";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEEP_ROTATED_FILES: usize = 5;
const PANIC_PAYLOAD_LIMIT: usize = 160;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: Once = Once::new();

/// Supported log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// `debug` for debug builds, `info` for release builds.
    pub fn for_build() -> Self {
        if cfg!(debug_assertions) {
            Self::Debug
        } else {
            Self::Info
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    UnsupportedLevel(String),
    /// Log directory is empty, relative or cannot be created.
    InvalidDirectory(String),
    /// Logging already runs with different settings.
    AlreadyActive { active: String, requested: String },
    Backend(String),
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(value) => write!(
                f,
                "unsupported log level `{value}`; expected trace|debug|info|warn|error"
            ),
            Self::InvalidDirectory(message) => write!(f, "invalid log directory: {message}"),
            Self::AlreadyActive { active, requested } => write!(
                f,
                "logging already active with {active}; refusing to switch to {requested}"
            ),
            Self::Backend(message) => write!(f, "logger backend failed: {message}"),
        }
    }
}

impl Error for LoggingError {}

/// Validated logger settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,
    /// Absolute directory holding the rolling files.
    pub dir: PathBuf,
    /// Also print `info` and above to stderr.
    pub mirror_to_stderr: bool,
}

impl LogSettings {
    pub fn new(level: &str, dir: &str) -> Result<Self, LoggingError> {
        let level =
            LogLevel::parse(level).ok_or_else(|| LoggingError::UnsupportedLevel(level.to_string()))?;
        let trimmed = dir.trim();
        if trimmed.is_empty() {
            return Err(LoggingError::InvalidDirectory("path is empty".to_string()));
        }
        let dir = Path::new(trimmed);
        if !dir.is_absolute() {
            return Err(LoggingError::InvalidDirectory(format!(
                "`{trimmed}` is not absolute"
            )));
        }
        Ok(Self {
            level,
            dir: dir.to_path_buf(),
            mirror_to_stderr: false,
        })
    }

    pub fn mirrored(mut self, mirror_to_stderr: bool) -> Self {
        self.mirror_to_stderr = mirror_to_stderr;
        self
    }

    fn describe(&self) -> String {
        format!("level={} dir={}", self.level.as_str(), self.dir.display())
    }

    /// Stderr mirroring may differ between callers; level and directory may not.
    fn conflicts_with(&self, other: &Self) -> bool {
        self.level != other.level || self.dir != other.dir
    }
}

struct ActiveLogger {
    settings: LogSettings,
    _handle: LoggerHandle,
}

/// Starts file logging at `level` under the absolute `log_dir`.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), LoggingError> {
    init_logging_with(level, log_dir, false)
}

/// Like [`init_logging`]; server binaries pass `mirror_to_stderr = true`.
pub fn init_logging_with(
    level: &str,
    log_dir: &str,
    mirror_to_stderr: bool,
) -> Result<(), LoggingError> {
    start_logging(LogSettings::new(level, log_dir)?.mirrored(mirror_to_stderr))
}

pub fn start_logging(settings: LogSettings) -> Result<(), LoggingError> {
    let active = ACTIVE.get_or_try_init(|| launch(settings.clone()))?;
    if active.settings.conflicts_with(&settings) {
        return Err(LoggingError::AlreadyActive {
            active: active.settings.describe(),
            requested: settings.describe(),
        });
    }
    Ok(())
}

/// `(level, dir)` of the running logger, if any.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    ACTIVE
        .get()
        .map(|active| (active.settings.level.as_str(), active.settings.dir.clone()))
}

pub fn default_log_level() -> &'static str {
    LogLevel::for_build().as_str()
}

fn launch(settings: LogSettings) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(&settings.dir).map_err(|err| {
        LoggingError::InvalidDirectory(format!("cannot create `{}`: {err}", settings.dir.display()))
    })?;

    let duplicate = if settings.mirror_to_stderr {
        Duplicate::Info
    } else {
        Duplicate::None
    };
    let handle = Logger::try_with_str(settings.level.as_str())
        .map_err(|err| LoggingError::Backend(err.to_string()))?
        .log_to_file(
            FileSpec::default()
                .directory(settings.dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEEP_ROTATED_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .duplicate_to_stderr(duplicate)
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    PANIC_HOOK.call_once(install_panic_hook);
    info!(
        "event=logging_start module=core status=ok level={} log_dir={} os={} version={}",
        settings.level.as_str(),
        settings.dir.display(),
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION")
    );

    Ok(ActiveLogger {
        settings,
        _handle: handle,
    })
}

fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(
            "event=panic module=core status=error location={} payload={}",
            location,
            single_line(&payload, PANIC_PAYLOAD_LIMIT)
        );
        previous(panic_info);
    }));
}

/// Flattens newlines and caps the length; payloads may echo record data.
fn single_line(value: &str, max_chars: usize) -> String {
    let flat = value.replace(['\n', '\r'], " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut cut = flat.chars().take(max_chars).collect::<String>();
    cut.push_str("...");
    cut
}
