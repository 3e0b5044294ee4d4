use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::credentials::{CredentialRecord, CredentialStore};
use crate::api::{ApiClient, ApiRequest};
use crate::config::Config;
use crate::error::{AppError, ErrorKind};
use crate::report::EventReporter;

/// Identity ("who am I") endpoint.
pub const USER_INFO_ENDPOINT: &str = "system/user/info";
pub const LOGIN_ENDPOINT: &str = "auth/login";

/// An authenticated user for the lifetime of one run. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub token: String,
    pub display_name: Option<String>,
}

/// Where the manager is in establishing a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    CachedCandidate(String),
    Validating(String),
    Authenticated(Session),
    LoginRequired(ErrorKind),
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::NoSession => "no_session",
            SessionState::CachedCandidate(_) => "cached_candidate",
            SessionState::Validating(_) => "validating",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::LoginRequired(_) => "login_required",
        }
    }
}

/// Identity fields returned by the user-info endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Identity {
    user_code: Option<String>,
    display_name: Option<String>,
}

impl Identity {
    /// The portal answers either flat or with the profile nested under `user`.
    fn from_payload(payload: &Value) -> Self {
        let profile = match payload.get("user") {
            Some(user @ Value::Object(_)) if payload.get("userCode").is_none() => user,
            _ => payload,
        };
        let text = |key: &str| {
            profile
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            user_code: text("userCode"),
            display_name: text("userName").or_else(|| text("nickName")),
        }
    }
}

pub struct SessionManager<'a> {
    config: &'a Config,
    store: CredentialStore,
    reporter: EventReporter,
}

impl<'a> SessionManager<'a> {
    pub fn new(config: &'a Config, store: CredentialStore, reporter: EventReporter) -> Self {
        Self {
            config,
            store,
            reporter,
        }
    }

    pub fn from_config(config: &'a Config, reporter: EventReporter) -> Self {
        Self::new(config, CredentialStore::from_config(config), reporter)
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Produce a session for `username`, reusing a cached token when it
    /// still validates and logging in otherwise. On success the client
    /// carries the session's token.
    pub async fn authenticate(
        &self,
        client: &mut ApiClient,
        username: &str,
        password: &str,
    ) -> Result<Session, AppError> {
        let mut state = SessionState::NoSession;
        loop {
            debug!(username, state = state.name(), "Session state");
            state = match state {
                SessionState::NoSession => self.check_cache(username, password),
                SessionState::CachedCandidate(token) => {
                    client.set_token(token.clone());
                    SessionState::Validating(token)
                }
                SessionState::Validating(token) => self.validate(client, username, token).await,
                SessionState::LoginRequired(reason) => {
                    debug!(username, reason = %reason, "Logging in");
                    let session = self.login(client, username, password).await?;
                    SessionState::Authenticated(session)
                }
                SessionState::Authenticated(session) => {
                    self.reporter.set_display_name(session.display_name.clone());
                    self.reporter.success("Login", "Login successful");
                    return Ok(session);
                }
            };
        }
    }

    fn check_cache(&self, username: &str, password: &str) -> SessionState {
        let records = self.store.load();
        let Some(record) = records.get(username) else {
            return SessionState::LoginRequired(ErrorKind::TokenInvalid);
        };
        if record.password != password {
            if let Err(e) = self.store.remove(username) {
                warn!(username, error = %e, "Failed to drop stale token record");
            }
            return SessionState::LoginRequired(ErrorKind::TokenInvalid);
        }
        if record.is_expired(self.config.token_expire_hours) || record.token.is_empty() {
            return SessionState::LoginRequired(ErrorKind::TokenExpired);
        }
        SessionState::CachedCandidate(record.token.clone())
    }

    async fn validate(&self, client: &mut ApiClient, username: &str, token: String) -> SessionState {
        let outcome = client.get(USER_INFO_ENDPOINT).await;
        let identity = match outcome.into_result() {
            Ok(payload) => Identity::from_payload(&payload),
            Err(e) => {
                debug!(username, error = %e, "Identity check failed");
                Identity::default()
            }
        };

        if identity.user_code.as_deref() == Some(username) {
            return SessionState::Authenticated(Session {
                username: username.to_string(),
                token,
                display_name: identity.display_name,
            });
        }

        client.clear_token();
        self.reporter
            .warning("Token invalid", "Cached token was rejected, logging in again");
        SessionState::LoginRequired(ErrorKind::TokenInvalid)
    }

    async fn login(
        &self,
        client: &mut ApiClient,
        username: &str,
        password: &str,
    ) -> Result<Session, AppError> {
        client.clear_token();
        let request = ApiRequest::post(
            LOGIN_ENDPOINT,
            json!({"username": username, "password": password}),
        )
        .without_auth();
        let outcome = client.execute(request).await;

        if let Some(message) = outcome.api_failure() {
            return Err(AppError::login_failed(message));
        }
        let token = outcome
            .payload()
            .and_then(|p| p.get("token"))
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::login_failed("no token in login response"))?;

        let record = CredentialRecord::new(token.clone(), password, Utc::now());
        if let Err(e) = self.store.upsert(username, record) {
            warn!(username, error = %e, "Failed to persist token record");
            self.reporter
                .warning("Token cache", &format!("Could not save login token: {}", e));
        }
        client.set_token(token.clone());

        let display_name = match client.get(USER_INFO_ENDPOINT).await.into_result() {
            Ok(payload) => Identity::from_payload(&payload).display_name,
            Err(_) => None,
        };

        Ok(Session {
            username: username.to_string(),
            token,
            display_name,
        })
    }
}
