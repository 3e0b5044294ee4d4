//! Transports carry one HTTP exchange per attempt.
//!
//! - `NativeTransport`: pooled `reqwest` client (HTTP and HTTPS)
//! - `StreamTransport`: plain HTTP/1.1 over a TCP stream, used when the
//!   native client is disabled or could not be built
//!
//! Both apply the request timeout to the single attempt. Neither inspects
//! the status code; the caller decides based on the body.

use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use reqwest::{Client, Method, Url};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::TransportError;

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

impl TransportRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    fn send<'a>(
        &'a self,
        request: &'a TransportRequest,
    ) -> BoxFuture<'a, Result<TransportResponse, TransportError>>;
}

// ============================================================================
// Native transport
// ============================================================================

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct NativeTransport {
    client: Client,
}

impl NativeTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }
}

impl Transport for NativeTransport {
    fn name(&self) -> &'static str {
        "native"
    }

    fn send<'a>(
        &'a self,
        request: &'a TransportRequest,
    ) -> BoxFuture<'a, Result<TransportResponse, TransportError>> {
        async move {
            let mut builder = self
                .client
                .request(request.method.clone(), &request.url)
                .timeout(request.timeout);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?.to_vec();
            Ok(TransportResponse { status, body })
        }
        .boxed()
    }
}

// ============================================================================
// Stream transport
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct StreamTransport;

impl StreamTransport {
    pub fn new() -> Self {
        Self
    }

    async fn exchange(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        let url = Url::parse(&request.url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", request.url, e)))?;
        if url.scheme() != "http" {
            return Err(TransportError::UnsupportedScheme(url.scheme().to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| TransportError::InvalidUrl(format!("{}: missing host", request.url)))?;
        let port = url.port_or_known_default().unwrap_or(80);

        let mut stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| TransportError::Connect(format!("{}:{}: {}", host, port, e)))?;

        let head = request_head(request, &url, host);
        stream.write_all(head.as_bytes()).await?;
        if let Some(body) = &request.body {
            stream.write_all(body).await?;
        }
        stream.flush().await?;

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await?;
        parse_response(&raw)
    }
}

impl Transport for StreamTransport {
    fn name(&self) -> &'static str {
        "stream"
    }

    fn send<'a>(
        &'a self,
        request: &'a TransportRequest,
    ) -> BoxFuture<'a, Result<TransportResponse, TransportError>> {
        async move {
            tokio::time::timeout(request.timeout, self.exchange(request))
                .await
                .map_err(|_| TransportError::Timeout(request.timeout))?
        }
        .boxed()
    }
}

fn request_head(request: &TransportRequest, url: &Url, host: &str) -> String {
    let target = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };
    let host_header = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let mut head = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\nAccept: application/json\r\n",
        request.method, target, host_header
    );
    for (name, value) in &request.headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    let body_len = request.body.as_ref().map(Vec::len).unwrap_or(0);
    if request.body.is_some() || request.method != Method::GET {
        head.push_str(&format!("Content-Length: {}\r\n", body_len));
    }
    head.push_str("\r\n");
    head
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_response(raw: &[u8]) -> Result<TransportResponse, TransportError> {
    let split = find(raw, b"\r\n\r\n")
        .ok_or_else(|| TransportError::Protocol("missing header terminator".into()))?;
    let head = String::from_utf8_lossy(&raw[..split]);
    let rest = &raw[split + 4..];

    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| TransportError::Protocol(format!("bad status line: {:?}", status_line)))?;

    let mut chunked = false;
    let mut content_length = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("transfer-encoding") {
            chunked = value.to_ascii_lowercase().contains("chunked");
        } else if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().ok();
        }
    }

    let body = if chunked {
        decode_chunked(rest)?
    } else if let Some(len) = content_length {
        if rest.len() < len {
            return Err(TransportError::Protocol(format!(
                "body truncated: expected {} bytes, got {}",
                len,
                rest.len()
            )));
        }
        rest[..len].to_vec()
    } else {
        rest.to_vec()
    };

    Ok(TransportResponse { status, body })
}

fn decode_chunked(mut data: &[u8]) -> Result<Vec<u8>, TransportError> {
    let mut body = Vec::new();
    loop {
        let line_end = find(data, b"\r\n")
            .ok_or_else(|| TransportError::Protocol("unterminated chunk size".into()))?;
        let size_line = String::from_utf8_lossy(&data[..line_end]);
        let size_hex = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| TransportError::Protocol(format!("bad chunk size: {:?}", size_hex)))?;
        data = &data[line_end + 2..];

        if size == 0 {
            return Ok(body);
        }
        if data.len().saturating_sub(2) < size {
            return Err(TransportError::Protocol("chunk truncated".into()));
        }
        body.extend_from_slice(&data[..size]);
        data = &data[size + 2..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(method: Method, url: String, body: Option<&str>) -> TransportRequest {
        TransportRequest {
            method,
            url,
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Authorization".to_string(), "tok-123".to_string()),
            ],
            body: body.map(|b| b.as_bytes().to_vec()),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_parse_content_length_response() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 7\r\n\r\n{\"a\":1}trailing";
        let response = parse_response(raw).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"{\"a\":1}");
    }

    #[test]
    fn test_parse_chunked_response() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\n{\"a\"\r\n3;ext=1\r\n:1}\r\n0\r\n\r\n";
        let response = parse_response(raw).unwrap();
        assert_eq!(response.body, b"{\"a\":1}");
    }

    #[test]
    fn test_parse_rejects_oversized_chunk() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nffffffffffffffff\r\nab\r\n0\r\n\r\n";
        assert!(matches!(
            parse_response(raw),
            Err(TransportError::Protocol(msg)) if msg == "chunk truncated"
        ));

        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nab";
        assert!(matches!(parse_response(raw), Err(TransportError::Protocol(_))));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_response(b"not http at all"),
            Err(TransportError::Protocol(_))
        ));
        assert!(matches!(
            parse_response(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort"),
            Err(TransportError::Protocol(_))
        ));
    }

    #[test]
    fn test_request_head_includes_length_and_port() {
        let req = request(Method::POST, "http://example.test:7000/api/auth/login?x=1".into(), Some("{}"));
        let url = Url::parse(&req.url).unwrap();
        let head = request_head(&req, &url, "example.test");
        assert!(head.starts_with("POST /api/auth/login?x=1 HTTP/1.1\r\n"));
        assert!(head.contains("Host: example.test:7000\r\n"));
        assert!(head.contains("Content-Length: 2\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_stream_transport_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(header("authorization", "tok-123"))
            .and(body_json(serde_json::json!({"username": "JS05533"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"token":"abc"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let transport = StreamTransport::new();
        let req = request(
            Method::POST,
            format!("{}/api/auth/login", server.uri()),
            Some(r#"{"username":"JS05533"}"#),
        );
        let response = transport.send(&req).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, br#"{"token":"abc"}"#);
    }

    #[tokio::test]
    async fn test_stream_transport_rejects_https() {
        let transport = StreamTransport::new();
        let req = request(Method::GET, "https://example.test/api".into(), None);
        assert!(matches!(
            transport.send(&req).await,
            Err(TransportError::UnsupportedScheme(_))
        ));
    }

    #[tokio::test]
    async fn test_stream_transport_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let transport = StreamTransport::new();
        let mut req = request(Method::GET, server.uri(), None);
        req.timeout = Duration::from_millis(50);
        let err = transport.send(&req).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(t) if t == Duration::from_millis(50)));
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_native_transport_returns_error_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/system/user/info"))
            .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"code":401}"#))
            .mount(&server)
            .await;

        let transport = NativeTransport::new().unwrap();
        let req = request(Method::GET, format!("{}/api/system/user/info", server.uri()), None);
        let response = transport.send(&req).await.unwrap();
        assert_eq!(response.status, 401);
        assert_eq!(response.body, br#"{"code":401}"#);
    }

    #[tokio::test]
    async fn test_native_transport_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let transport = NativeTransport::new().unwrap();
        let mut req = request(Method::GET, server.uri(), None);
        req.timeout = Duration::from_millis(50);
        let err = transport.send(&req).await.unwrap_err();
        assert!(err.is_timeout());
    }
}
