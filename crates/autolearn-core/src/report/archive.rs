//! Read-only access to persisted run logs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;

use super::log_file::{ERROR_PREFIX, PRIMARY_PREFIX};
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Primary,
    Error,
}

impl LogKind {
    fn prefix(&self) -> &'static str {
        match self {
            LogKind::Primary => PRIMARY_PREFIX,
            LogKind::Error => ERROR_PREFIX,
        }
    }

    fn dir<'a>(&self, config: &'a Config) -> &'a Path {
        match self {
            LogKind::Primary => &config.log_dir,
            LogKind::Error => &config.err_log_dir,
        }
    }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Invalid log file name: {0}")]
    InvalidName(String),

    #[error("Log file not found: {0}")]
    NotFound(String),

    #[error("Log file is outside the log directory: {0}")]
    OutsideDirectory(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Date-stamped log file names of `kind`, newest first.
pub fn list_log_files(config: &Config, kind: LogKind) -> Result<Vec<String>, ArchiveError> {
    let dir = kind.dir(config);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| parse_log_name(name) == Some(kind))
        .collect();
    names.sort_unstable_by(|a, b| b.cmp(a));
    Ok(names)
}

/// Contents of one log file, addressed by bare file name.
pub fn read_log_file(config: &Config, name: &str) -> Result<String, ArchiveError> {
    let kind = parse_log_name(name).ok_or_else(|| ArchiveError::InvalidName(name.to_string()))?;
    let dir = kind.dir(config);
    let path = dir.join(name);
    if !path.is_file() {
        return Err(ArchiveError::NotFound(name.to_string()));
    }

    let base = canonical(dir)?;
    let resolved = canonical(&path)?;
    if !resolved.starts_with(&base) {
        return Err(ArchiveError::OutsideDirectory(name.to_string()));
    }
    Ok(fs::read_to_string(resolved)?)
}

fn canonical(path: &Path) -> Result<PathBuf, ArchiveError> {
    Ok(fs::canonicalize(path)?)
}

/// Classify `log_YYYY-MM-DD.txt` / `error_YYYY-MM-DD.txt`; anything else is rejected.
fn parse_log_name(name: &str) -> Option<LogKind> {
    let stem = name.strip_suffix(".txt")?;
    let (kind, date) = if let Some(date) = stem.strip_prefix(LogKind::Primary.prefix()) {
        (LogKind::Primary, date)
    } else {
        (LogKind::Error, stem.strip_prefix(LogKind::Error.prefix())?)
    };
    if date.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some(kind)
}
