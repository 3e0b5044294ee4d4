//! Event reporting for a run.
//!
//! This module provides:
//! - `EventReporter`: streams one live message per event and buffers log entries
//! - `LiveChannel`: the push-then-flush output boundary (stdout, memory)
//! - `LogBuffer`/`LogFiles`: date-stamped logs with rotation and retention
//! - `archive`: listing and reading persisted logs

pub mod archive;
pub mod channel;
pub mod event;
pub mod log_file;
pub mod reporter;

pub use channel::{LiveChannel, MemoryChannel, WriterChannel};
pub use event::{LiveMessage, LogEntry, RunCounters, Severity};
pub use log_file::{LogBuffer, LogFiles};
pub use reporter::{Event, EventReporter, UNAUTHENTICATED};
