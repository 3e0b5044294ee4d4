//! API client for the training portal REST API.
//!
//! `ApiClient` issues one logical request at a time with a per-attempt
//! timeout, linear backoff between attempts and a native/stream transport
//! choice. It never returns an error: every call resolves to an [`Outcome`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use super::outcome::{Outcome, FAILURE_CODE};
use super::transport::{NativeTransport, StreamTransport, Transport, TransportRequest};
use super::TransportError;
use crate::config::Config;
use crate::report::EventReporter;

// ============================================================================
// Constants
// ============================================================================

const CONTENT_TYPE_JSON: &str = "application/json";

/// One logical call against an endpoint relative to the base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub endpoint: String,
    pub method: Method,
    pub body: Option<Value>,
    pub use_auth_token: bool,
    pub timeout: Option<Duration>,
    pub max_attempts: Option<u32>,
}

impl ApiRequest {
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: Method::GET,
            body: None,
            use_auth_token: true,
            timeout: None,
            max_attempts: None,
        }
    }

    pub fn post(endpoint: impl Into<String>, body: Value) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: Method::POST,
            body: Some(body),
            use_auth_token: true,
            timeout: None,
            max_attempts: None,
        }
    }

    /// Do not attach the bearer token (used by the login call itself).
    pub fn without_auth(mut self) -> Self {
        self.use_auth_token = false;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }
}

/// API client for the training portal.
/// Clone is cheap - transports and the reporter are shared.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    native: Option<Arc<dyn Transport>>,
    stream: Arc<dyn Transport>,
    timeout: Duration,
    max_attempts: u32,
    retry_delay: Duration,
    reporter: EventReporter,
}

impl ApiClient {
    /// Create a client with the transports selected by configuration.
    pub fn new(config: &Config, reporter: EventReporter) -> Self {
        let native: Option<Arc<dyn Transport>> = if config.use_native_transport {
            match NativeTransport::new() {
                Ok(transport) => Some(Arc::new(transport)),
                Err(e) => {
                    warn!(error = %e, "Native transport unavailable, using stream transport");
                    None
                }
            }
        } else {
            None
        };
        Self::with_transports(config, reporter, native, Arc::new(StreamTransport::new()))
    }

    pub fn with_transports(
        config: &Config,
        reporter: EventReporter,
        native: Option<Arc<dyn Transport>>,
        stream: Arc<dyn Transport>,
    ) -> Self {
        Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: None,
            native,
            stream,
            timeout: config.request_timeout(),
            max_attempts: config.api_max_retries.max(1),
            retry_delay: config.retry_delay(),
            reporter,
        }
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Create a new ApiClient with the given token, sharing the transports.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            token: Some(token),
            ..self.clone()
        }
    }

    pub fn reporter(&self) -> &EventReporter {
        &self.reporter
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Name of the transport requests go through.
    pub fn transport_name(&self) -> &'static str {
        self.transport().name()
    }

    fn transport(&self) -> &dyn Transport {
        match &self.native {
            Some(native) => native.as_ref(),
            None => self.stream.as_ref(),
        }
    }

    fn headers(&self, use_auth_token: bool) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".to_string(), CONTENT_TYPE_JSON.to_string())];
        if use_auth_token {
            if let Some(ref token) = self.token {
                headers.push(("Authorization".to_string(), token.clone()));
            }
        }
        headers
    }

    pub async fn get(&self, endpoint: &str) -> Outcome {
        self.execute(ApiRequest::get(endpoint)).await
    }

    pub async fn post(&self, endpoint: &str, body: Value) -> Outcome {
        self.execute(ApiRequest::post(endpoint, body)).await
    }

    /// Run one logical request to completion.
    ///
    /// Attempts are tried up to `max_attempts` times. After failed attempt
    /// `n` the client waits `n * retry_delay` before trying again. The first
    /// attempt whose body decodes as JSON wins.
    pub async fn execute(&self, request: ApiRequest) -> Outcome {
        let body = match request.body.as_ref().map(serde_json::to_vec).transpose() {
            Ok(body) => body,
            Err(e) => {
                return Outcome::failure(FAILURE_CODE, format!("failed to encode request body: {}", e));
            }
        };
        let transport_request = TransportRequest {
            method: request.method.clone(),
            url: self.url(&request.endpoint),
            headers: self.headers(request.use_auth_token),
            body,
            timeout: request.timeout.unwrap_or(self.timeout),
        };
        let max_attempts = request.max_attempts.unwrap_or(self.max_attempts).max(1);
        let endpoint = request.endpoint.as_str();

        let mut attempt = 0;
        let mut last_error = String::new();
        while attempt < max_attempts {
            attempt += 1;
            match self.attempt(&transport_request).await {
                Ok(payload) => {
                    if attempt > 1 {
                        self.reporter.success(
                            "Request recovered",
                            &format!("{} succeeded on attempt {}/{}", endpoint, attempt, max_attempts),
                        );
                    }
                    return Outcome::Success(payload);
                }
                Err(e) => {
                    let label = if e.is_timeout() {
                        "Request timed out"
                    } else {
                        "Request failed"
                    };
                    debug!(endpoint, attempt, max_attempts, error = %e, "{}", label);
                    last_error = e.to_string();

                    if attempt < max_attempts {
                        let wait = self.retry_delay * attempt;
                        self.reporter.warning(
                            label,
                            &format!(
                                "{}: {}; retrying in {}s (attempt {}/{})",
                                endpoint,
                                last_error,
                                wait.as_secs_f64(),
                                attempt + 1,
                                max_attempts
                            ),
                        );
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }

        let message = format!("request failed after {} retries: {}", max_attempts, last_error);
        self.reporter.error("Request failed", &format!("{}: {}", endpoint, message));
        Outcome::failure(FAILURE_CODE, message)
    }

    async fn attempt(&self, request: &TransportRequest) -> Result<Value, TransportError> {
        let transport = self.transport();
        let response = transport.send(request).await?;
        debug!(
            transport = transport.name(),
            url = %request.url,
            status = response.status,
            bytes = response.body.len(),
            "Received response"
        );
        serde_json::from_slice(&response.body)
            .map_err(|e| TransportError::invalid_json(&e, &response.body))
    }
}
