//! Process logging bootstrap.
//!
//! # Responsibility
//! - Initialize the `log` backend exactly once per process.
//! - Route records to a rotated file set or to stderr.
//!
//! # Invariants
//! - Logging init is idempotent for the same level and target.
//! - Logging initialization must not panic.
//! - Re-initialization with a different level or target is rejected.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "social";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();

/// Where log records are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    Directory(PathBuf),
}

impl Display for LogTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stderr => write!(f, "stderr"),
            Self::Directory(dir) => write!(f, "{}", dir.display()),
        }
    }
}

struct LoggingState {
    level: &'static str,
    target: LogTarget,
    _logger: LoggerHandle,
}

/// Initializes process logging.
///
/// `log_dir = None` logs to stderr; `Some(dir)` logs to size-rotated files
/// under `dir`.
///
/// # Errors
/// - Returns an error when `level` is unsupported.
/// - Returns an error when `log_dir` is empty, non-absolute, or cannot be created.
/// - Returns an error when logging is already active with another configuration.
/// - Returns an error when logger backend setup fails.
pub fn init_logging(level: &str, log_dir: Option<&str>) -> Result<(), String> {
    let normalized_level = normalize_level(level)?;
    let target = match log_dir {
        Some(dir) => LogTarget::Directory(normalize_log_dir(dir)?),
        None => LogTarget::Stderr,
    };

    let state = LOGGING_STATE.get_or_try_init(|| -> Result<LoggingState, String> {
        let logger = start_logger(normalized_level, &target)?;
        install_panic_hook_once();

        info!(
            "event=app_start module=core status=ok platform={} build_mode={} version={}",
            std::env::consts::OS,
            build_mode(),
            env!("CARGO_PKG_VERSION")
        );
        info!(
            "event=logging_init module=core status=ok level={} target={}",
            normalized_level, target
        );

        Ok(LoggingState {
            level: normalized_level,
            target: target.clone(),
            _logger: logger,
        })
    })?;

    if state.target != target {
        return Err(format!(
            "logging already initialized to `{}`; refusing to switch to `{}`",
            state.target, target
        ));
    }
    if state.level != normalized_level {
        return Err(format!(
            "logging already initialized with level `{}`; refusing to switch to `{}`",
            state.level, normalized_level
        ));
    }

    Ok(())
}

/// Active `(level, target)`, or `None` before initialization.
pub fn logging_status() -> Option<(&'static str, LogTarget)> {
    LOGGING_STATE
        .get()
        .map(|state| (state.level, state.target.clone()))
}

/// Returns the default log level for current build mode.
///
/// - `debug` builds -> `debug`
/// - `release` builds -> `info`
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_logger(level: &'static str, target: &LogTarget) -> Result<LoggerHandle, String> {
    let logger = Logger::try_with_str(level)
        .map_err(|err| format!("invalid log level `{level}`: {err}"))?;

    let logger = match target {
        LogTarget::Stderr => logger
            .log_to_stderr()
            .format_for_stderr(flexi_logger::detailed_format)
            .write_mode(WriteMode::Direct),
        LogTarget::Directory(dir) => {
            std::fs::create_dir_all(dir).map_err(|err| {
                format!("failed to create log directory `{}`: {err}", dir.display())
            })?;
            logger
                .log_to_file(
                    FileSpec::default()
                        .directory(dir.as_path())
                        .basename(LOG_FILE_BASENAME),
                )
                .rotate(
                    Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                    Naming::Numbers,
                    Cleanup::KeepLogFiles(MAX_LOG_FILES),
                )
                .write_mode(WriteMode::BufferAndFlush)
                .append()
                .format_for_files(flexi_logger::detailed_format)
        }
    };

    logger
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))
}

fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

fn normalize_log_dir(log_dir: &str) -> Result<PathBuf, String> {
    let trimmed = log_dir.trim();
    if trimmed.is_empty() {
        return Err("log_dir cannot be empty".to_string());
    }
    let path = Path::new(trimmed);
    if !path.is_absolute() {
        return Err(format!("log_dir must be an absolute path, got `{trimmed}`"));
    }
    Ok(path.to_path_buf())
}

fn build_mode() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    }
}

fn install_panic_hook_once() {
    if PANIC_HOOK_INSTALLED.get().is_some() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        // Payloads may echo request data; keep them single-line and bounded.
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_payload_summary(panic_info);
        error!(
            "event=panic_captured module=core status=error location={} payload={}",
            location, payload
        );
        previous_hook(panic_info);
    }));

    let _ = PANIC_HOOK_INSTALLED.set(());
}

fn panic_payload_summary(info: &std::panic::PanicHookInfo<'_>) -> String {
    let payload = if let Some(message) = info.payload().downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = info.payload().downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    };

    sanitize_message(&payload, MAX_PANIC_PAYLOAD_CHARS)
}

fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(max_chars).collect::<String>();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}
