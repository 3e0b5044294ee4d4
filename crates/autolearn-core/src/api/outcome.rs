use serde_json::Value;

use crate::error::AppError;

/// Code used for locally synthesized failures and for portal error payloads.
pub const FAILURE_CODE: i64 = 500;

/// Result of one logical network call: a decoded payload or a failure, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    Failure { code: i64, message: String },
}

impl Outcome {
    pub fn failure(code: i64, message: impl Into<String>) -> Self {
        Outcome::Failure {
            code,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Failure { .. } => None,
        }
    }

    /// The portal reports errors in-band as `{"code": 500, "msg": "..."}`,
    /// sometimes with the code as a string.
    /// Returns the message of such a payload, or of a transport failure.
    pub fn api_failure(&self) -> Option<String> {
        match self {
            Outcome::Failure { message, .. } => Some(message.clone()),
            Outcome::Success(value) => {
                let code = match value.get("code")? {
                    Value::Number(n) => n.as_i64()?,
                    Value::String(s) => s.trim().parse::<i64>().ok()?,
                    _ => return None,
                };
                if code != FAILURE_CODE {
                    return None;
                }
                Some(
                    value
                        .get("msg")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                )
            }
        }
    }

    /// Convert to a payload, mapping failures and error payloads to `API_ERROR`.
    pub fn into_result(self) -> Result<Value, AppError> {
        if let Some(message) = self.api_failure() {
            return Err(AppError::api(message));
        }
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure { message, .. } => Err(AppError::api(message)),
        }
    }
}
