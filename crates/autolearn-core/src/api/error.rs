use std::time::Duration;

use thiserror::Error;

/// Why a single transport attempt failed.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported URL scheme for stream transport: {0}")]
    UnsupportedScheme(String),

    #[error("Malformed HTTP response: {0}")]
    Protocol(String),

    #[error("Invalid JSON response: {0}")]
    InvalidJson(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl TransportError {
    /// Timeout-like failures are reported distinctly but retried the same way.
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Timeout(_) => true,
            TransportError::Network(e) => e.is_timeout(),
            TransportError::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    /// Build an `InvalidJson` error quoting a bounded prefix of the body.
    pub fn invalid_json(error: &serde_json::Error, body: &[u8]) -> Self {
        let text = String::from_utf8_lossy(body);
        let quoted = if text.len() <= MAX_ERROR_BODY_LENGTH {
            text.into_owned()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &text[..end], text.len())
        };
        TransportError::InvalidJson(format!("{} (body: {:?})", error, quoted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(TransportError::Io(std::io::ErrorKind::TimedOut.into()).is_timeout());
        assert!(!TransportError::Connect("refused".into()).is_timeout());
    }

    #[test]
    fn test_invalid_json_truncates_body() {
        let body = "x".repeat(2000);
        let err = serde_json::from_str::<serde_json::Value>(&body).unwrap_err();
        let msg = TransportError::invalid_json(&err, body.as_bytes()).to_string();
        assert!(msg.contains("truncated, 2000 total bytes"));
        assert!(msg.len() < 1000);
    }
}
