//! One end-to-end run: parse the login request, establish a session, then
//! work through courses and exams, reporting every step.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use chrono::Local;
use futures::FutureExt;
use rand::seq::SliceRandom;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::api::ApiClient;
use crate::auth::SessionManager;
use crate::config::Config;
use crate::error::{AppError, ErrorKind};
use crate::report::{Event, EventReporter, RunCounters, Severity};
use crate::tasks::{CourseRunner, ExamRunner, TaskSummary};

const MOTIVATIONAL_QUOTES: &[&str] = &[
    "Every expert was once a beginner.",
    "Small steps every day add up to big results.",
    "Learning never exhausts the mind.",
    "The best time to start was yesterday. The next best time is now.",
    "Knowledge is the one investment that always pays interest.",
];

const ACCESS_TIP: &str =
    "This account is not enabled for automated learning. Contact the administrator to request access.";

/// Credentials from the inbound request body.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl LoginRequest {
    /// Parse `{"username"|"loginName": ..., "password": ...}`. The username is
    /// trimmed and upper-cased.
    pub fn parse(body: &[u8]) -> Result<Self, AppError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|_| AppError::invalid_input("invalid request data"))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, AppError> {
        let text = |key: &str| value.get(key).and_then(Value::as_str);
        let username = text("username")
            .or_else(|| text("loginName"))
            .ok_or_else(|| AppError::invalid_input("invalid request data"))?
            .trim()
            .to_uppercase();
        let password = text("password")
            .ok_or_else(|| AppError::invalid_input("invalid request data"))?
            .to_string();

        if username.is_empty() || password.is_empty() {
            return Err(AppError::invalid_input("username and password must not be empty"));
        }
        Ok(Self { username, password })
    }
}

/// What a run achieved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutcome {
    /// The error that ended the run early, if any.
    pub error: Option<AppError>,
    pub courses: TaskSummary,
    pub exams: TaskSummary,
    pub counters: RunCounters,
    pub elapsed_secs: f64,
}

impl RunOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    fn ended(error: AppError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

pub struct Runner<'a> {
    config: &'a Config,
    client: ApiClient,
    reporter: EventReporter,
}

impl<'a> Runner<'a> {
    pub fn new(config: &'a Config, reporter: EventReporter) -> Self {
        Self::with_client(config, ApiClient::new(config, reporter))
    }

    pub fn with_client(config: &'a Config, client: ApiClient) -> Self {
        let reporter = client.reporter().clone();
        Self {
            config,
            client,
            reporter,
        }
    }

    /// Drive one run for the raw request `body`. Never fails; the log buffer
    /// is flushed on every path.
    pub async fn run(&mut self, body: &[u8]) -> RunOutcome {
        let result = AssertUnwindSafe(self.drive(body)).catch_unwind().await;
        let mut outcome = match result {
            Ok(outcome) => outcome,
            Err(panic) => {
                let err = AppError::system(panic_message(panic.as_ref()));
                error!(error = %err, "Run aborted");
                self.reporter.error("System error", &err.message);
                RunOutcome::ended(err)
            }
        };
        outcome.counters = self.reporter.counters();
        outcome.elapsed_secs = self.reporter.elapsed_secs();
        self.reporter.finish();
        outcome
    }

    async fn drive(&mut self, body: &[u8]) -> RunOutcome {
        self.reporter.divider();
        self.reporter.log_only(
            Severity::Info,
            "Start",
            &format!("Run started at {}", Local::now().format("%Y-%m-%d %H:%M:%S")),
        );

        match self.steps(body).await {
            Ok(outcome) => outcome,
            Err(err) => {
                match err.kind {
                    // Already answered with the welcome, quote and tip.
                    ErrorKind::Unauthorized => {}
                    ErrorKind::InvalidInput => self.reporter.error("Invalid request", &err.message),
                    ErrorKind::LoginFailed => self.reporter.error("Login failed", &err.message),
                    _ => self.reporter.error("System error", &err.message),
                }
                info!(kind = %err.kind, "Run ended early");
                RunOutcome::ended(err)
            }
        }
    }

    async fn steps(&mut self, body: &[u8]) -> Result<RunOutcome, AppError> {
        let request = LoginRequest::parse(body)?;
        let username = request.username.as_str();
        self.reporter.set_actor(username);
        self.reporter
            .emit(Event::new(Severity::Info, "Welcome", format!("Welcome, {}", username)).transient());

        if !self.config.is_authorized(username) {
            self.turn_away();
            return Err(AppError::unauthorized(format!("{} is not on the allow-list", username)));
        }

        let session = SessionManager::from_config(self.config, self.reporter.clone())
            .authenticate(&mut self.client, username, &request.password)
            .await?;
        debug!(username = %session.username, "Session established");

        let courses = CourseRunner::new(self.config, &self.client).run().await;
        let exams = ExamRunner::new(self.config, &self.client).run().await;

        let counters = self.reporter.counters();
        self.reporter.info(
            "Finished",
            &format!(
                "Elapsed {}s, courses completed: {}, exams completed: {}",
                self.reporter.elapsed_secs(),
                counters.courses_completed,
                counters.exams_completed
            ),
        );
        self.reporter.divider();

        Ok(RunOutcome {
            courses,
            exams,
            ..RunOutcome::default()
        })
    }

    fn turn_away(&self) {
        let quote = MOTIVATIONAL_QUOTES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or_default();
        self.reporter
            .emit(Event::new(Severity::Info, "Keep going", quote).transient());
        self.reporter.info("Tip", ACCESS_TIP);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unexpected failure".to_string()
    }
}
