//! Automation client for the training portal.
//!
//! A run authenticates one user, completes their pending video courses and
//! takes their exams, streaming every step as an NDJSON event and keeping
//! date-stamped log files.
//!
//! - [`api`]: request execution with retry, transport fallback and pagination
//! - [`auth`]: encrypted token cache and session establishment
//! - [`report`]: live event stream and buffered log files
//! - [`tasks`]: course and exam orchestration
//! - [`run`]: the end-to-end run driver

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod report;
pub mod run;
pub mod tasks;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorKind};
pub use run::{LoginRequest, RunOutcome, Runner};
