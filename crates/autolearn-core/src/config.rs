//! Application configuration management.
//!
//! Configuration is built once at startup and then shared read-only with
//! every component. Values are layered: built-in defaults, then an optional
//! JSON file, then environment overrides.
//!
//! The file is looked up at `--config`, `./autolearn.json`, or
//! `~/.config/autolearn/config.json`, in that order.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::report::Severity;

/// Application name used for config directory paths
const APP_NAME: &str = "autolearn";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Config file name looked up in the working directory
const LOCAL_CONFIG_FILE: &str = "autolearn.json";

/// Default API endpoint of the training portal.
const DEFAULT_API_BASE_URL: &str = "http://api.hebeiluhang.com:7000/api";

/// Default symmetric secret for the token cache.
const DEFAULT_ENCRYPTION_KEY: &str = "AutoLearnSystem2024SecretKey!@#$%^&*";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    /// Per-attempt request timeout in seconds.
    pub api_timeout: u64,
    /// Total attempts per logical request (initial try included).
    pub api_max_retries: u32,
    /// Retry delay base in seconds; the wait before attempt `n + 1` is `n * base`.
    pub api_retry_delay: u64,
    pub page_size: u32,

    pub token_file: PathBuf,
    pub encryption_key: String,
    pub token_expire_hours: u64,

    pub log_dir: PathBuf,
    pub err_log_dir: PathBuf,
    pub log_level: Severity,
    pub log_buffer_size: usize,
    pub max_backup_files: usize,
    pub max_log_size: u64,

    /// Use the pooled native client; when false every attempt goes over the
    /// plain stream transport.
    pub use_native_transport: bool,

    pub authorized_users: Vec<String>,

    pub exam_time_limit: u64,
    pub exam_answer_delay: u64,
    pub exam_pass_score: i64,
    /// Pause between consecutive task steps, in milliseconds.
    pub step_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_timeout: 120,
            api_max_retries: 3,
            api_retry_delay: 2,
            page_size: 10,
            token_file: PathBuf::from("tokens.json"),
            encryption_key: DEFAULT_ENCRYPTION_KEY.to_string(),
            token_expire_hours: 24,
            log_dir: PathBuf::from("logs"),
            err_log_dir: PathBuf::from("errs"),
            log_level: Severity::Info,
            log_buffer_size: 100,
            max_backup_files: 10,
            max_log_size: 10 * 1024 * 1024,
            use_native_transport: true,
            authorized_users: [
                "JS05533", "JS02319", "JS03912", "JS01521", "JS00003", "JS05764", "JS01806",
                "JS00949", "JS02466",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            exam_time_limit: 1800,
            exam_answer_delay: 30,
            exam_pass_score: 90,
            step_delay_ms: 0,
        }
    }
}

impl Config {
    /// Load configuration from `path` (or the default locations), then apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn default_path() -> Option<PathBuf> {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join(APP_NAME).join(CONFIG_FILE))
            .filter(|path| path.exists())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("API_BASE_URL") {
            if !url.is_empty() {
                self.api_base_url = url;
            }
        }
        if let Ok(key) = std::env::var("AUTOLEARN_ENCRYPTION_KEY") {
            if !key.is_empty() {
                self.encryption_key = key;
            }
        }
        if let Ok(level) = std::env::var("AUTOLEARN_LOG_LEVEL") {
            match level.parse() {
                Ok(level) => self.log_level = level,
                Err(_) => debug!(level = %level, "Ignoring unknown AUTOLEARN_LOG_LEVEL"),
            }
        }
        if let Ok(dir) = std::env::var("AUTOLEARN_DATA_DIR") {
            if !dir.is_empty() {
                self.rebase(Path::new(&dir));
            }
        }
    }

    /// Resolve relative file locations against `base`.
    pub fn rebase(&mut self, base: &Path) {
        for path in [&mut self.token_file, &mut self.log_dir, &mut self.err_log_dir] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be greater than 0".into()));
        }
        if self.api_max_retries == 0 {
            return Err(ConfigError::Invalid("api_max_retries must be at least 1".into()));
        }
        if self.encryption_key.is_empty() {
            return Err(ConfigError::Invalid("encryption_key must not be empty".into()));
        }
        if self.log_buffer_size == 0 {
            return Err(ConfigError::Invalid("log_buffer_size must be at least 1".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.api_retry_delay)
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    /// Whether `username` (already upper-cased) is on the allow-list.
    pub fn is_authorized(&self, username: &str) -> bool {
        self.authorized_users
            .iter()
            .any(|user| user.eq_ignore_ascii_case(username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.page_size, 10);
        assert_eq!(config.log_buffer_size, 100);
        assert_eq!(config.max_log_size, 10 * 1024 * 1024);
        assert_eq!(config.retry_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"page_size": 25, "log_level": "debug"}"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.log_level, Severity::Debug);
        assert_eq!(config.api_max_retries, 3);
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let config = Config {
            page_size: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rebase_only_touches_relative_paths() {
        let mut config = Config {
            token_file: PathBuf::from("/var/lib/autolearn/tokens.json"),
            ..Config::default()
        };
        config.rebase(Path::new("/srv/data"));
        assert_eq!(config.token_file, PathBuf::from("/var/lib/autolearn/tokens.json"));
        assert_eq!(config.log_dir, PathBuf::from("/srv/data/logs"));
    }

    #[test]
    fn test_allow_list_lookup() {
        let config = Config::default();
        assert!(config.is_authorized("JS05533"));
        assert!(!config.is_authorized("ZZ99999"));
    }
}
