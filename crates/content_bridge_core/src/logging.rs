//! Process-wide rolling-file logging for the bridge.
//!
//! # Responsibility
//! - Start the file logger once per process and remember its settings.
//! - Keep bridge diagnostics metadata-only: content bytes are never logged and
//!   URIs are truncated before they reach a log line.
//!
//! # Invariants
//! - A repeated init with identical settings is a no-op.
//! - A repeated init with other settings is rejected, never applied.
//! - Initialization never panics.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "content_bridge";
const ROTATE_AT_BYTES: u64 = 8 * 1024 * 1024;
const KEPT_LOG_FILES: usize = 4;
const PANIC_MESSAGE_LIMIT: usize = 160;
const URI_LIMIT: usize = 96;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Accepted verbosity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Case-insensitive parse; `warning` is accepted for `warn`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
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
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings the active logger was started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingStatus {
    pub level: LogLevel,
    pub log_dir: PathBuf,
}

impl LoggingStatus {
    fn parse(level: &str, log_dir: &str) -> Result<Self, String> {
        let level = LogLevel::parse(level).ok_or_else(|| {
            format!(
                "unsupported log level `{}`; expected trace|debug|info|warn|error",
                level.trim()
            )
        })?;

        let dir = log_dir.trim();
        if dir.is_empty() {
            return Err("log_dir cannot be empty".to_string());
        }
        let log_dir = PathBuf::from(dir);
        if !log_dir.is_absolute() {
            return Err(format!("log_dir must be an absolute path, got `{dir}`"));
        }
        Ok(Self { level, log_dir })
    }

    fn ensure_same(&self, requested: &LoggingStatus) -> Result<(), String> {
        if self.log_dir != requested.log_dir {
            return Err(format!(
                "logging already writes to `{}`; refusing to switch to `{}`",
                self.log_dir.display(),
                requested.log_dir.display()
            ));
        }
        if self.level != requested.level {
            return Err(format!(
                "logging already runs at `{}`; refusing to switch to `{}`",
                self.level, requested.level
            ));
        }
        Ok(())
    }
}

struct ActiveLogger {
    status: LoggingStatus,
    _handle: LoggerHandle,
}

/// Starts bridge logging at `level`, writing rolling files under `log_dir`.
///
/// # Errors
/// - Unsupported `level`.
/// - Empty or relative `log_dir`, or a directory that cannot be created.
/// - Logging already active with different settings.
/// - Logger backend setup failure.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), String> {
    let requested = LoggingStatus::parse(level, log_dir)?;
    let active = ACTIVE.get_or_try_init(|| start(&requested))?;
    active.status.ensure_same(&requested)
}

/// Settings of the active logger, if logging was started.
pub fn logging_status() -> Option<LoggingStatus> {
    ACTIVE.get().map(|active| active.status.clone())
}

/// Default level for the current build mode (`debug` or `info`).
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        LogLevel::Debug.as_str()
    } else {
        LogLevel::Info.as_str()
    }
}

/// Single-line, length-capped rendering of a URI or call name for log lines.
pub fn sanitize_for_log(value: &str) -> String {
    single_line(value, URI_LIMIT)
}

fn start(settings: &LoggingStatus) -> Result<ActiveLogger, String> {
    let dir = settings.log_dir.as_path();
    std::fs::create_dir_all(dir)
        .map_err(|err| format!("failed to create log directory `{}`: {err}", dir.display()))?;

    let handle = Logger::try_with_str(settings.level.as_str())
        .map_err(|err| format!("invalid log level `{}`: {err}", settings.level))?
        .log_to_file(file_spec(dir))
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEPT_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    install_panic_hook();
    info!(
        "event=bridge_start module=logging status=ok os={} version={} debug_build={}",
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION"),
        cfg!(debug_assertions)
    );
    info!(
        "event=logging_init module=logging status=ok level={} log_dir={}",
        settings.level,
        dir.display()
    );

    Ok(ActiveLogger {
        status: settings.clone(),
        _handle: handle,
    })
}

fn file_spec(dir: &Path) -> FileSpec {
    FileSpec::default().directory(dir).basename(LOG_FILE_BASENAME)
}

fn install_panic_hook() {
    if PANIC_HOOK.set(()).is_err() {
        return;
    }

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
        let thread = std::thread::current();
        // Stream workers are named `content-stream-<id>`.
        error!(
            "event=panic_captured module=logging status=error thread={} location={location} payload={}",
            thread.name().unwrap_or("unnamed"),
            single_line(&payload, PANIC_MESSAGE_LIMIT)
        );
        previous(panic_info);
    }));
}

fn single_line(value: &str, limit: usize) -> String {
    let mut rendered: String = value
        .chars()
        .take(limit)
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if value.chars().nth(limit).is_some() {
        rendered.push_str("...");
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::{init_logging, logging_status, sanitize_for_log, single_line, LogLevel, LoggingStatus};
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn log_level_parse_is_case_insensitive() {
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse(" warning "), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("verbose"), None);
    }

    #[test]
    fn settings_reject_relative_and_empty_dirs() {
        let error = LoggingStatus::parse("info", "logs/dev").expect_err("relative dir must fail");
        assert!(error.contains("absolute"));
        assert!(LoggingStatus::parse("info", "  ").is_err());
        assert!(LoggingStatus::parse("loud", "/tmp").is_err());
    }

    #[test]
    fn single_line_strips_control_chars_and_caps_length() {
        let rendered = single_line("line1\nline2\rline3", 8);
        assert!(!rendered.contains('\n'));
        assert!(!rendered.contains('\r'));
        assert_eq!(rendered, "line1 li...");
        assert_eq!(single_line("short", 8), "short");

        let long_uri = format!("content://{}", "x".repeat(500));
        assert!(sanitize_for_log(&long_uri).chars().count() < 120);
    }

    fn unique_temp_dir(suffix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "content-bridge-logging-{suffix}-{}-{nanos}",
            std::process::id()
        ))
    }

    #[test]
    fn init_logging_is_idempotent_and_rejects_other_settings() {
        let log_dir = unique_temp_dir("idempotent");
        let log_dir_str = log_dir.to_str().expect("utf-8 path").to_string();
        let other_dir_str = unique_temp_dir("different")
            .to_str()
            .expect("utf-8 path")
            .to_string();

        init_logging("info", &log_dir_str).expect("first init should succeed");
        init_logging("INFO", &log_dir_str).expect("same settings should be a no-op");

        let level_error =
            init_logging("debug", &log_dir_str).expect_err("level change should fail");
        assert!(level_error.contains("refusing to switch"));

        let dir_error =
            init_logging("info", &other_dir_str).expect_err("directory change should fail");
        assert!(dir_error.contains("refusing to switch"));

        let status = logging_status().expect("logging should be active");
        assert_eq!(status.level, LogLevel::Info);
        assert_eq!(status.log_dir, log_dir);
    }
}
