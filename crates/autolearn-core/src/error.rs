use std::fmt;

use thiserror::Error;

/// Run-level error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or empty credentials in the inbound request.
    InvalidInput,
    /// Username is not on the allow-list.
    Unauthorized,
    /// The portal rejected the credentials or returned no token.
    LoginFailed,
    /// Cached token is past its TTL.
    TokenExpired,
    /// Cached token was rejected by the identity check.
    TokenInvalid,
    /// A downstream call failed or returned an error payload.
    ApiError,
    /// Anything uncategorized, including decode failures.
    SystemError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::LoginFailed => "LOGIN_FAILED",
            ErrorKind::TokenExpired => "TOKEN_EXPIRED",
            ErrorKind::TokenInvalid => "TOKEN_INVALID",
            ErrorKind::ApiError => "API_ERROR",
            ErrorKind::SystemError => "SYSTEM_ERROR",
        }
    }

    /// Fatal kinds end the run without a statistics summary.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidInput
                | ErrorKind::Unauthorized
                | ErrorKind::LoginFailed
                | ErrorKind::SystemError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn login_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LoginFailed, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ApiError, message)
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SystemError, message)
    }
}

pub type AppResult<T> = Result<T, AppError>;
