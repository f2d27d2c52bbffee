//! Logging bootstrap.
//!
//! stdout carries the IPC protocol, so log output goes to stderr and, when a
//! directory is configured, to rotating files there as well. Initialization
//! happens at most once per process.

use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::info;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "recordsd";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();

struct LoggingState {
    level: String,
    log_dir: Option<PathBuf>,
    _logger: LoggerHandle,
}

/// Starts the logger. Repeating the call with the same arguments is a no-op;
/// different arguments after the first successful call are rejected.
pub fn init_logging(level: &str, log_dir: Option<&Path>) -> Result<(), String> {
    if let Some(state) = LOGGING_STATE.get() {
        if state.level == level && state.log_dir.as_deref() == log_dir {
            return Ok(());
        }
        return Err(format!(
            "logging already initialized with level `{}`; refusing to reconfigure",
            state.level
        ));
    }

    LOGGING_STATE.get_or_try_init(|| -> Result<LoggingState, String> {
        let base = Logger::try_with_str(level)
            .map_err(|err| format!("invalid log level `{level}`: {err}"))?;
        let logger = match log_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|err| {
                    format!("failed to create log directory `{}`: {err}", dir.display())
                })?;
                base.log_to_file(
                    FileSpec::default()
                        .directory(dir)
                        .basename(LOG_FILE_BASENAME),
                )
                .rotate(
                    Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                    Naming::Numbers,
                    Cleanup::KeepLogFiles(MAX_LOG_FILES),
                )
                .duplicate_to_stderr(Duplicate::Warn)
                .write_mode(WriteMode::BufferAndFlush)
                .append()
                .format_for_files(flexi_logger::detailed_format)
                .format_for_stderr(flexi_logger::detailed_format)
                .start()
            }
            None => base
                .log_to_stderr()
                .format(flexi_logger::detailed_format)
                .start(),
        }
        .map_err(|err| format!("failed to start logger: {err}"))?;

        info!(
            "event=app_start module=core status=ok version={} level={} log_dir={}",
            env!("CARGO_PKG_VERSION"),
            level,
            log_dir
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "-".to_string())
        );

        Ok(LoggingState {
            level: level.to_string(),
            log_dir: log_dir.map(Path::to_path_buf),
            _logger: logger,
        })
    })?;
    Ok(())
}
