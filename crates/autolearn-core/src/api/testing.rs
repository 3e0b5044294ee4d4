//! In-memory transport and reporter fixtures shared by unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use super::transport::{Transport, TransportRequest, TransportResponse};
use super::TransportError;
use crate::report::{EventReporter, LiveMessage, LogBuffer, LogFiles, MemoryChannel, Severity};

type Handler = dyn Fn(usize, &TransportRequest) -> Result<TransportResponse, TransportError> + Send + Sync;

/// Answers each request through a handler that receives the zero-based call index.
pub struct MockTransport {
    handler: Box<Handler>,
    calls: AtomicUsize,
    requests: Mutex<Vec<TransportRequest>>,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(usize, &TransportRequest) -> Result<TransportResponse, TransportError>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Endpoint paths (relative to the test base URL) in call order.
    pub fn endpoints(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| r.url.trim_start_matches(TEST_BASE_URL).trim_start_matches('/').to_string())
            .collect()
    }
}

impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn send<'a>(
        &'a self,
        request: &'a TransportRequest,
    ) -> BoxFuture<'a, Result<TransportResponse, TransportError>> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let result = (self.handler)(index, request);
        async move { result }.boxed()
    }
}

pub const TEST_BASE_URL: &str = "http://portal.test/api";

pub fn json_response(value: Value) -> Result<TransportResponse, TransportError> {
    Ok(TransportResponse {
        status: 200,
        body: serde_json::to_vec(&value).unwrap(),
    })
}

pub fn connect_error() -> Result<TransportResponse, TransportError> {
    Err(TransportError::Connect("connection refused".to_string()))
}

pub fn request_body(request: &TransportRequest) -> Value {
    request
        .body
        .as_ref()
        .map(|b| serde_json::from_slice(b).unwrap())
        .unwrap_or(Value::Null)
}

pub fn test_reporter(dir: &Path) -> (EventReporter, MemoryChannel) {
    let channel = MemoryChannel::new();
    let files = LogFiles::new(dir.join("logs"), dir.join("errs"), u64::MAX, 10);
    let reporter = EventReporter::new(
        Box::new(channel.clone()),
        LogBuffer::new(files, 100, Severity::Debug),
        "127.0.0.1",
    );
    (reporter, channel)
}

pub fn live_messages(channel: &MemoryChannel) -> Vec<LiveMessage> {
    channel
        .messages()
        .iter()
        .map(|m| serde_json::from_str(m).unwrap())
        .collect()
}
