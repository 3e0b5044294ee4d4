//! Persistent run logs.
//!
//! Entries are written to `log_<date>.txt` in the log directory, and
//! warnings/errors are duplicated to `error_<date>.txt` in the error log
//! directory. Each batch append holds an exclusive file lock so concurrent
//! runs never interleave within a batch.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDate};
use fs2::FileExt;
use tracing::{debug, warn};

use super::event::{LogEntry, Severity};
use crate::config::Config;

pub const PRIMARY_PREFIX: &str = "log_";
pub const ERROR_PREFIX: &str = "error_";
const LOG_EXTENSION: &str = "txt";
const BACKUP_EXTENSION: &str = "bak";

#[derive(Debug, Clone)]
pub struct LogFiles {
    log_dir: PathBuf,
    err_dir: PathBuf,
    max_log_size: u64,
    max_backups: usize,
}

impl LogFiles {
    pub fn new(log_dir: PathBuf, err_dir: PathBuf, max_log_size: u64, max_backups: usize) -> Self {
        Self {
            log_dir,
            err_dir,
            max_log_size,
            max_backups,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.log_dir.clone(),
            config.err_log_dir.clone(),
            config.max_log_size,
            config.max_backup_files,
        )
    }

    pub fn primary_path(&self, date: NaiveDate) -> PathBuf {
        self.log_dir.join(format!(
            "{}{}.{}",
            PRIMARY_PREFIX,
            date.format("%Y-%m-%d"),
            LOG_EXTENSION
        ))
    }

    pub fn error_path(&self, date: NaiveDate) -> PathBuf {
        self.err_dir.join(format!(
            "{}{}.{}",
            ERROR_PREFIX,
            date.format("%Y-%m-%d"),
            LOG_EXTENSION
        ))
    }

    /// Append a batch in order, then rotate any primary log that grew past
    /// the size threshold.
    ///
    /// The primary log is the commit point. Entries whose primary lines were
    /// written are removed from `pending`, so a retry never appends them
    /// twice. Error-log and rotation failures are logged and do not fail the
    /// batch.
    pub fn write_batch(&self, pending: &mut Vec<LogEntry>) -> io::Result<()> {
        if pending.is_empty() {
            return Ok(());
        }

        let mut primary: BTreeMap<NaiveDate, String> = BTreeMap::new();
        let mut errors: BTreeMap<NaiveDate, String> = BTreeMap::new();
        for entry in pending.iter() {
            let date = entry.timestamp.date_naive();
            let line = entry.format_line();
            if entry.severity.is_problem() {
                push_line(errors.entry(date).or_default(), &line);
            }
            push_line(primary.entry(date).or_default(), &line);
        }

        fs::create_dir_all(&self.log_dir)?;
        for (date, text) in &primary {
            let path = self.primary_path(*date);
            append_locked(&path, text)?;
            pending.retain(|entry| entry.timestamp.date_naive() != *date);

            if let Some(text) = errors.get(date) {
                let path = self.error_path(*date);
                if let Err(e) = fs::create_dir_all(&self.err_dir).and_then(|_| append_locked(&path, text)) {
                    warn!(path = %path.display(), error = %e, "Failed to write error log");
                }
            }
        }

        let now = Local::now();
        for date in primary.keys() {
            let path = self.primary_path(*date);
            if let Err(e) = self.rotate_if_needed(&path, now) {
                warn!(path = %path.display(), error = %e, "Failed to rotate log file");
            }
        }
        Ok(())
    }

    /// Rename `path` to a timestamped backup once it exceeds the threshold.
    pub fn rotate_if_needed(&self, path: &Path, now: DateTime<Local>) -> io::Result<Option<PathBuf>> {
        let len = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        if len <= self.max_log_size {
            return Ok(None);
        }

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("log");
        let stamp = now.format("%H%M%S").to_string();
        let mut backup = self.log_dir.join(format!("{}_{}.{}", stem, stamp, BACKUP_EXTENSION));
        let mut suffix = 1;
        while backup.exists() {
            backup = self.log_dir.join(format!("{}_{}_{}.{}", stem, stamp, suffix, BACKUP_EXTENSION));
            suffix += 1;
        }
        fs::rename(path, &backup)?;
        debug!(from = %path.display(), to = %backup.display(), size = len, "Rotated log file");

        self.prune_backups()?;
        Ok(Some(backup))
    }

    /// Delete the oldest backups (by modification time) beyond the retention count.
    pub fn prune_backups(&self) -> io::Result<usize> {
        let mut backups: Vec<(SystemTime, PathBuf)> = Vec::new();
        for dir_entry in fs::read_dir(&self.log_dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            let is_backup = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(PRIMARY_PREFIX))
                .unwrap_or(false)
                && path.extension().and_then(|e| e.to_str()) == Some(BACKUP_EXTENSION);
            if is_backup {
                let modified = dir_entry.metadata()?.modified()?;
                backups.push((modified, path));
            }
        }

        if backups.len() <= self.max_backups {
            return Ok(0);
        }

        backups.sort_by_key(|(modified, _)| *modified);
        let excess = backups.len() - self.max_backups;
        for (_, path) in backups.drain(..excess) {
            fs::remove_file(&path)?;
            debug!(path = %path.display(), "Removed old log backup");
        }
        Ok(excess)
    }
}

fn push_line(text: &mut String, line: &str) {
    text.push_str(line);
    text.push('\n');
}

fn append_locked(path: &Path, text: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock_exclusive()?;
    let written = file.write_all(text.as_bytes()).and_then(|_| file.flush());
    let unlocked = FileExt::unlock(&file);
    written?;
    unlocked
}

/// Pending entries kept across failed flushes, in multiples of the capacity.
const MAX_PENDING_BATCHES: usize = 4;

/// Ordered, level-filtered buffer in front of [`LogFiles`].
pub struct LogBuffer {
    entries: Vec<LogEntry>,
    capacity: usize,
    min_level: Severity,
    files: LogFiles,
    flush_count: usize,
}

impl LogBuffer {
    pub fn new(files: LogFiles, capacity: usize, min_level: Severity) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            min_level,
            files,
            flush_count: 0,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            LogFiles::from_config(config),
            config.log_buffer_size,
            config.log_level,
        )
    }

    /// Buffer an entry, flushing when capacity is reached. Returns `false`
    /// when the entry was filtered out by the minimum level.
    pub fn push(&mut self, entry: LogEntry) -> io::Result<bool> {
        if !entry.severity.passes(self.min_level) {
            return Ok(false);
        }
        self.entries.push(entry);
        if self.entries.len() >= self.capacity {
            if let Err(e) = self.flush() {
                self.trim_pending();
                return Err(e);
            }
        }
        Ok(true)
    }

    /// Write every buffered entry. Entries stay buffered until their
    /// primary log lines have been written.
    pub fn flush(&mut self) -> io::Result<()> {
        if self.entries.is_empty() {
            return Ok(());
        }
        self.files.write_batch(&mut self.entries)?;
        self.flush_count += 1;
        Ok(())
    }

    /// Drop the oldest entries once failed flushes pile up.
    fn trim_pending(&mut self) {
        let limit = self.capacity.saturating_mul(MAX_PENDING_BATCHES);
        if self.entries.len() > limit {
            let dropped = self.entries.len() - limit;
            self.entries.drain(..dropped);
            warn!(dropped, pending = limit, "Log buffer full, dropped oldest entries");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn flush_count(&self) -> usize {
        self.flush_count
    }

    pub fn files(&self) -> &LogFiles {
        &self.files
    }
}

impl Drop for LogBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, pending = self.entries.len(), "Failed to flush log buffer on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn entry(severity: Severity, content: &str) -> LogEntry {
        LogEntry {
            timestamp: Local.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            severity,
            actor: "JS05533".to_string(),
            source_ip: "local".to_string(),
            action: "Test".to_string(),
            content: content.to_string(),
            divider: false,
        }
    }

    fn files_in(dir: &Path, max_log_size: u64, max_backups: usize) -> LogFiles {
        LogFiles::new(dir.join("logs"), dir.join("errs"), max_log_size, max_backups)
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn test_batch_preserves_order_and_duplicates_problems() {
        let dir = tempfile::tempdir().unwrap();
        let files = files_in(dir.path(), u64::MAX, 10);
        let mut batch = vec![
            entry(Severity::Info, "first"),
            entry(Severity::Warning, "second"),
            entry(Severity::Success, "third"),
            entry(Severity::Error, "fourth"),
        ];
        files.write_batch(&mut batch).unwrap();
        assert!(batch.is_empty());

        let primary = fs::read_to_string(files.primary_path(date())).unwrap();
        let lines: Vec<&str> = primary.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("first"));
        assert!(lines[3].ends_with("fourth"));

        let errors = fs::read_to_string(files.error_path(date())).unwrap();
        let lines: Vec<&str> = errors.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("second"));
        assert!(lines[1].ends_with("fourth"));
    }

    #[test]
    fn test_no_error_file_without_problems() {
        let dir = tempfile::tempdir().unwrap();
        let files = files_in(dir.path(), u64::MAX, 10);
        files.write_batch(&mut vec![entry(Severity::Info, "quiet")]).unwrap();
        assert!(!files.error_path(date()).exists());
    }

    #[test]
    fn test_rotation_when_over_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let files = files_in(dir.path(), 32, 10);
        files
            .write_batch(&mut vec![entry(Severity::Info, &"x".repeat(64))])
            .unwrap();

        assert!(!files.primary_path(date()).exists());
        let backups: Vec<String> = fs::read_dir(dir.path().join("logs"))
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(backups.len(), 1);
        assert!(backups[0].starts_with("log_2024-05-01_"));
        assert!(backups[0].ends_with(".bak"));
    }

    #[test]
    fn test_rotation_within_one_second_keeps_both_backups() {
        let dir = tempfile::tempdir().unwrap();
        let files = files_in(dir.path(), 4, 10);
        let log_dir = dir.path().join("logs");
        fs::create_dir_all(&log_dir).unwrap();
        let path = files.primary_path(date());
        let now = Local.with_ymd_and_hms(2024, 5, 1, 10, 15, 0).unwrap();

        fs::write(&path, "first batch").unwrap();
        let first = files.rotate_if_needed(&path, now).unwrap().unwrap();
        fs::write(&path, "second batch").unwrap();
        let second = files.rotate_if_needed(&path, now).unwrap().unwrap();

        assert_ne!(first, second);
        assert_eq!(fs::read_to_string(&first).unwrap(), "first batch");
        assert_eq!(fs::read_to_string(&second).unwrap(), "second batch");
        assert!(second.to_string_lossy().ends_with("log_2024-05-01_101500_1.bak"));
    }

    #[test]
    fn test_prune_removes_oldest_backups() {
        let dir = tempfile::tempdir().unwrap();
        let files = files_in(dir.path(), u64::MAX, 2);
        let log_dir = dir.path().join("logs");
        fs::create_dir_all(&log_dir).unwrap();

        let base = SystemTime::now() - Duration::from_secs(3600);
        for (i, name) in ["log_a.bak", "log_b.bak", "log_c.bak", "log_d.bak"].iter().enumerate() {
            let path = log_dir.join(name);
            let file = fs::File::create(&path).unwrap();
            file.set_modified(base + Duration::from_secs(i as u64 * 60)).unwrap();
        }
        fs::write(log_dir.join("log_2024-05-01.txt"), "keep").unwrap();

        assert_eq!(files.prune_backups().unwrap(), 2);
        assert!(!log_dir.join("log_a.bak").exists());
        assert!(!log_dir.join("log_b.bak").exists());
        assert!(log_dir.join("log_c.bak").exists());
        assert!(log_dir.join("log_d.bak").exists());
        assert!(log_dir.join("log_2024-05-01.txt").exists());
    }

    #[test]
    fn test_buffer_auto_flush_at_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let files = files_in(dir.path(), u64::MAX, 10);
        let path = files.primary_path(date());
        let mut buffer = LogBuffer::new(files, 100, Severity::Info);

        for i in 0..150 {
            buffer.push(entry(Severity::Info, &format!("event {}", i))).unwrap();
            if i == 98 {
                assert_eq!(buffer.flush_count(), 0);
                assert!(!path.exists());
            }
        }

        assert_eq!(buffer.flush_count(), 1);
        assert_eq!(buffer.len(), 50);
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 100);

        buffer.flush().unwrap();
        assert_eq!(buffer.flush_count(), 2);
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 150);
    }

    #[test]
    fn test_buffer_drops_below_minimum_level() {
        let dir = tempfile::tempdir().unwrap();
        let files = files_in(dir.path(), u64::MAX, 10);
        let mut buffer = LogBuffer::new(files.clone(), 100, Severity::Info);

        assert!(!buffer.push(entry(Severity::Debug, "hidden")).unwrap());
        assert!(buffer.push(entry(Severity::Error, "shown")).unwrap());
        buffer.flush().unwrap();

        let primary = fs::read_to_string(files.primary_path(date())).unwrap();
        let errors = fs::read_to_string(files.error_path(date())).unwrap();
        assert!(!primary.contains("hidden"));
        assert!(!errors.contains("hidden"));
        assert!(primary.contains("shown"));
    }

    #[test]
    fn test_unwritable_error_log_does_not_repeat_primary_lines() {
        let dir = tempfile::tempdir().unwrap();
        let err_dir = dir.path().join("errs");
        fs::write(&err_dir, "not a directory").unwrap();
        let files = LogFiles::new(dir.path().join("logs"), err_dir, u64::MAX, 10);
        let path = files.primary_path(date());
        let mut buffer = LogBuffer::new(files, 2, Severity::Info);

        buffer.push(entry(Severity::Info, "one")).unwrap();
        buffer.push(entry(Severity::Warning, "two")).unwrap();
        assert_eq!(buffer.flush_count(), 1);
        assert!(buffer.is_empty());

        buffer.push(entry(Severity::Info, "three")).unwrap();
        buffer.flush().unwrap();

        let primary = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = primary.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("one"));
        assert!(lines[1].ends_with("two"));
        assert!(lines[2].ends_with("three"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_failed_flushes_keep_bounded_backlog() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        fs::write(&log_dir, "not a directory").unwrap();
        let files = LogFiles::new(log_dir, dir.path().join("errs"), u64::MAX, 10);
        let mut buffer = LogBuffer::new(files, 2, Severity::Info);

        assert!(buffer.push(entry(Severity::Info, "event 0")).unwrap());
        for i in 1..20 {
            assert!(buffer.push(entry(Severity::Info, &format!("event {}", i))).is_err());
        }
        assert_eq!(buffer.len(), 2 * MAX_PENDING_BATCHES);
        assert_eq!(buffer.flush_count(), 0);
        assert!(buffer.flush().is_err());
    }

    #[test]
    fn test_drop_flushes_remaining_entries() {
        let dir = tempfile::tempdir().unwrap();
        let files = files_in(dir.path(), u64::MAX, 10);
        let path = files.primary_path(date());
        {
            let mut buffer = LogBuffer::new(files, 100, Severity::Info);
            buffer.push(entry(Severity::Info, "pending")).unwrap();
        }
        assert!(fs::read_to_string(path).unwrap().contains("pending"));
    }
}
