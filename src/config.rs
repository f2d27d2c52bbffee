//! Process configuration read from the environment at startup.

use anyhow::anyhow;
use std::path::PathBuf;

pub const ENV_LOG_LEVEL: &str = "RECORDSD_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "RECORDSD_LOG_DIR";
pub const ENV_WORKSPACE: &str = "RECORDSD_WORKSPACE";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub log_level: String,
    /// Rotating log files are written here in addition to stderr.
    pub log_dir: Option<PathBuf>,
    /// Workspace opened before the first request, if set.
    pub workspace: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
            workspace: None,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(level) = non_empty(ENV_LOG_LEVEL) {
            let level = level.to_ascii_lowercase();
            if !LOG_LEVELS.contains(&level.as_str()) {
                return Err(anyhow!(
                    "{ENV_LOG_LEVEL} must be one of {}, got `{level}`",
                    LOG_LEVELS.join("|")
                ));
            }
            cfg.log_level = level;
        }
        if let Some(dir) = non_empty(ENV_LOG_DIR) {
            let dir = PathBuf::from(dir);
            if !dir.is_absolute() {
                return Err(anyhow!(
                    "{ENV_LOG_DIR} must be an absolute path, got `{}`",
                    dir.display()
                ));
            }
            cfg.log_dir = Some(dir);
        }
        cfg.workspace = non_empty(ENV_WORKSPACE).map(PathBuf::from);
        Ok(cfg)
    }
}
