//! The single channel for user-visible and log-visible events.
//!
//! Every `report` call produces exactly one live message, pushed and flushed
//! before the call returns. Persisted events are additionally formatted into
//! log entries and buffered until capacity is reached or the run finishes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Local;
use tracing::warn;

use super::channel::LiveChannel;
use super::event::{clamp_progress, LiveMessage, LogEntry, RunCounters, Severity};
use super::log_file::LogBuffer;
use crate::config::Config;

/// Actor label used before a username is known.
pub const UNAUTHENTICATED: &str = "unauthenticated";

const DIVIDER_WIDTH: usize = 50;

/// One event to report.
#[derive(Debug, Clone)]
pub struct Event {
    pub severity: Severity,
    pub title: String,
    pub content: String,
    pub persist: bool,
    pub progress: Option<f64>,
}

impl Event {
    pub fn new(severity: Severity, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            content: content.into(),
            persist: true,
            progress: None,
        }
    }

    /// Stream live only; never written to the log files.
    pub fn transient(mut self) -> Self {
        self.persist = false;
        self
    }

    pub fn progress(mut self, percent: f64) -> Self {
        self.progress = Some(percent);
        self
    }
}

struct ReporterState {
    live: Box<dyn LiveChannel>,
    buffer: LogBuffer,
    actor: String,
    source_ip: String,
    display_name: Option<String>,
    counters: RunCounters,
    started: Instant,
    emitted: u64,
}

/// Cheaply cloneable handle; clones report into the same channel and buffer.
#[derive(Clone)]
pub struct EventReporter {
    state: Arc<Mutex<ReporterState>>,
}

impl EventReporter {
    pub fn new(live: Box<dyn LiveChannel>, buffer: LogBuffer, source_ip: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ReporterState {
                live,
                buffer,
                actor: UNAUTHENTICATED.to_string(),
                source_ip: source_ip.into(),
                display_name: None,
                counters: RunCounters::default(),
                started: Instant::now(),
                emitted: 0,
            })),
        }
    }

    pub fn from_config(
        config: &Config,
        live: Box<dyn LiveChannel>,
        source_ip: impl Into<String>,
    ) -> Self {
        Self::new(live, LogBuffer::from_config(config), source_ip)
    }

    fn lock(&self) -> MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn report(&self, severity: Severity, title: &str, content: &str) {
        self.emit(Event::new(severity, title, content));
    }

    pub fn emit(&self, event: Event) {
        let mut state = self.lock();

        let message = LiveMessage {
            severity: event.severity,
            title: event.title.clone(),
            content: event.content.clone(),
            progress: event.progress.map(clamp_progress),
            stats: state.counters,
            elapsed: round_secs(state.started.elapsed().as_secs_f64()),
            display_name: state.display_name.clone(),
        };
        let line = match serde_json::to_string(&message) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to encode live message");
                format!(
                    r#"{{"type":"error","title":"Encoding error","content":"{}"}}"#,
                    e.to_string().replace('"', "'")
                )
            }
        };
        if let Err(e) = state.live.push(&line) {
            warn!(error = %e, "Failed to write live message");
        }
        state.emitted += 1;

        if event.persist {
            let entry = LogEntry {
                timestamp: Local::now(),
                severity: event.severity,
                actor: state.actor.clone(),
                source_ip: state.source_ip.clone(),
                action: event.title,
                content: event.content,
                divider: false,
            };
            if let Err(e) = state.buffer.push(entry) {
                warn!(error = %e, "Failed to flush log buffer");
            }
        }
    }

    pub fn debug(&self, title: &str, content: &str) {
        self.report(Severity::Debug, title, content);
    }

    pub fn info(&self, title: &str, content: &str) {
        self.report(Severity::Info, title, content);
    }

    pub fn success(&self, title: &str, content: &str) {
        self.report(Severity::Success, title, content);
    }

    pub fn warning(&self, title: &str, content: &str) {
        self.report(Severity::Warning, title, content);
    }

    pub fn error(&self, title: &str, content: &str) {
        self.report(Severity::Error, title, content);
    }

    /// Persist a run-boundary divider. Dividers are log-only.
    pub fn divider(&self) {
        self.buffer_only(Severity::Info, "Divider", &"=".repeat(DIVIDER_WIDTH), true);
    }

    /// Persist an entry without streaming it.
    pub fn log_only(&self, severity: Severity, title: &str, content: &str) {
        self.buffer_only(severity, title, content, false);
    }

    fn buffer_only(&self, severity: Severity, title: &str, content: &str, divider: bool) {
        let mut state = self.lock();
        let entry = LogEntry {
            timestamp: Local::now(),
            severity,
            actor: state.actor.clone(),
            source_ip: state.source_ip.clone(),
            action: title.to_string(),
            content: content.to_string(),
            divider,
        };
        if let Err(e) = state.buffer.push(entry) {
            warn!(error = %e, "Failed to flush log buffer");
        }
    }

    /// Write out everything still buffered. Called unconditionally at run end.
    pub fn finish(&self) {
        if let Err(e) = self.lock().buffer.flush() {
            warn!(error = %e, "Failed to flush log buffer at run end");
        }
    }

    pub fn set_actor(&self, actor: &str) {
        self.lock().actor = actor.to_string();
    }

    pub fn set_display_name(&self, name: Option<String>) {
        self.lock().display_name = name;
    }

    pub fn record_course_completed(&self) -> u32 {
        let mut state = self.lock();
        state.counters.courses_completed += 1;
        state.counters.courses_completed
    }

    pub fn record_exam_completed(&self) -> u32 {
        let mut state = self.lock();
        state.counters.exams_completed += 1;
        state.counters.exams_completed
    }

    pub fn counters(&self) -> RunCounters {
        self.lock().counters
    }

    pub fn elapsed_secs(&self) -> f64 {
        round_secs(self.lock().started.elapsed().as_secs_f64())
    }

    /// Number of live messages emitted so far.
    pub fn emitted(&self) -> u64 {
        self.lock().emitted
    }

    pub fn buffered(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn flush_count(&self) -> usize {
        self.lock().buffer.flush_count()
    }
}

fn round_secs(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}
