use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Event severity. `Success` is an informational level for positive outcomes
/// and ranks with `Info` for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Success,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Severity::Debug => 0,
            Severity::Info | Severity::Success => 1,
            Severity::Warning => 2,
            Severity::Error => 3,
        }
    }

    /// Whether this severity passes a minimum-level filter.
    pub fn passes(&self, minimum: Severity) -> bool {
        self.rank() >= minimum.rank()
    }

    /// Warnings and errors are duplicated to the error log.
    pub fn is_problem(&self) -> bool {
        matches!(self, Severity::Warning | Severity::Error)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "success" => Ok(Severity::Success),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// Running totals carried on every live message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub courses_completed: u32,
    pub exams_completed: u32,
}

/// One message on the live stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMessage {
    #[serde(rename = "type")]
    pub severity: Severity,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    pub stats: RunCounters,
    /// Seconds since the reporter was created.
    pub elapsed: f64,
    #[serde(
        default,
        rename = "displayName",
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,
}

/// A buffered log record awaiting flush.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub severity: Severity,
    pub actor: String,
    pub source_ip: String,
    pub action: String,
    pub content: String,
    /// Dividers are written verbatim without the field wrapper.
    pub divider: bool,
}

impl LogEntry {
    pub fn format_line(&self) -> String {
        if self.divider {
            return self.content.clone();
        }
        format!(
            "[{}] [{}] [User:{}] [IP:{}] [Action:{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.severity,
            self.actor,
            self.source_ip,
            self.action,
            self.content
        )
    }
}

/// Clamp an optional percentage into `0..=100`.
pub fn clamp_progress(percent: f64) -> u8 {
    if percent.is_nan() {
        return 0;
    }
    percent.round().clamp(0.0, 100.0) as u8
}
