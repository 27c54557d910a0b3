use std::fmt;

use chrono::Utc;

use super::StatusCode;
use super::headers::{CONTENT_TYPE_XML, HeaderMap};

const CRLF: &[u8] = b"\r\n";

/// `HTTP/<major>.<minor>` with single-digit components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HttpVersion {
    pub major: u8,
    pub minor: u8,
}

impl HttpVersion {
    pub const HTTP_1_0: HttpVersion = HttpVersion { major: 1, minor: 0 };
    pub const HTTP_1_1: HttpVersion = HttpVersion { major: 1, minor: 1 };

    /// Parse a version token, `None` unless it is exactly `HTTP/d.d`.
    pub fn parse(token: &str) -> Option<Self> {
        let rest = token.strip_prefix("HTTP/")?;
        let &[major, b'.', minor] = rest.as_bytes() else {
            return None;
        };
        if !major.is_ascii_digit() || !minor.is_ascii_digit() {
            return None;
        }
        Some(HttpVersion {
            major: major - b'0',
            minor: minor - b'0',
        })
    }

    pub fn is_supported(&self) -> bool {
        *self <= Self::HTTP_1_1
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

/// A framed HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub target: String,
    pub version: HttpVersion,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// A `POST` request with no headers yet.
    pub fn post(target: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: "POST".to_string(),
            target: target.into(),
            version: HttpVersion::HTTP_1_1,
            headers: HeaderMap::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serialize exactly as held: headers in order, no header is added.
    pub fn encode(&self) -> Vec<u8> {
        let start = format!("{} {} {}", self.method, self.target, self.version);
        encode_message(&start, &self.headers, &self.body)
    }
}

/// A framed HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub version: HttpVersion,
    pub status: StatusCode,
    pub reason: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: Vec<u8>) -> Self {
        Self {
            version: HttpVersion::HTTP_1_1,
            status,
            reason: status.reason().to_string(),
            headers: HeaderMap::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let start = format!("{} {} {}", self.version, self.status.as_u16(), self.reason);
        encode_message(&start, &self.headers, &self.body)
    }
}

fn encode_message(start_line: &str, headers: &HeaderMap, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(start_line.len() + 32 * headers.len() + body.len() + 4);
    out.extend_from_slice(start_line.as_bytes());
    out.extend_from_slice(CRLF);
    for (name, value) in headers.iter() {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(CRLF);
    }
    out.extend_from_slice(CRLF);
    out.extend_from_slice(body);
    out
}

/// Frame an XML payload as the client's `POST` request.
pub fn wrap_request(body: &[u8], host: &str, user_agent: &str) -> Vec<u8> {
    HttpRequest::post("/", body.to_vec())
        .with_header("Host", host)
        .with_header("Connection", "close")
        .with_header("User-Agent", user_agent)
        .with_header("Content-Type", CONTENT_TYPE_XML)
        .with_header("Content-Length", body.len().to_string())
        .encode()
}

/// Frame a reply. Error statuses are sent with whatever body is given,
/// normally empty.
pub fn wrap_response(body: &[u8], status: StatusCode, server_name: &str) -> Vec<u8> {
    HttpResponse::new(status, body.to_vec())
        .with_header("Server", server_name)
        .with_header("Date", http_date())
        .with_header("Connection", "close")
        .with_header("Content-Length", body.len().to_string())
        .with_header("Content-Type", CONTENT_TYPE_XML)
        .encode()
}

fn http_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
