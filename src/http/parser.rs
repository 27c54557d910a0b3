//! Sequential parser for request and response envelopes.
//!
//! The parser walks a byte cursor forward only: start line, header lines,
//! blank line, then checks the required headers, the content type and the
//! body length against what was actually delivered.

use super::headers::{
    self, CONTENT_TYPE_XML, HeaderMap, REQUIRED_REQUEST_HEADERS, REQUIRED_RESPONSE_HEADERS,
};
use super::message::{HttpRequest, HttpResponse, HttpVersion};
use super::StatusCode;
use crate::error::EnvelopeError;

const SP: u8 = b' ';
const CR: u8 = b'\r';
const LF: u8 = b'\n';
const COLON: u8 = b':';

const KNOWN_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "DELETE", "HEAD", "PATCH", "OPTIONS", "CONNECT", "TRACE",
];

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Token up to `delim`; the delimiter is consumed but not returned.
    fn read_until(&mut self, delim: u8, what: &str) -> Result<&'a str, EnvelopeError> {
        let rest = &self.data[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == delim)
            .ok_or_else(|| EnvelopeError::bad_request(format!("unterminated {}", what)))?;
        let token = std::str::from_utf8(&rest[..len])
            .map_err(|_| EnvelopeError::bad_request(format!("{} is not valid UTF-8", what)))?;
        self.pos += len + 1;
        Ok(token)
    }

    fn expect(&mut self, byte: u8, what: &str) -> Result<(), EnvelopeError> {
        if self.data.get(self.pos) == Some(&byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(EnvelopeError::bad_request(format!("expected {}", what)))
        }
    }

    fn at_crlf(&self) -> bool {
        self.data[self.pos..].starts_with(&[CR, LF])
    }

    fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

/// Parse a client request frame.
pub fn parse_request(data: &[u8]) -> Result<HttpRequest, EnvelopeError> {
    let mut cursor = Cursor::new(data);

    let method = cursor.read_until(SP, "method")?;
    if !KNOWN_METHODS.contains(&method) {
        return Err(EnvelopeError::bad_request(format!(
            "unknown method '{}'",
            method
        )));
    }
    if method != "POST" {
        return Err(EnvelopeError::MethodNotAllowed(method.to_string()));
    }

    let target = cursor.read_until(SP, "request target")?;
    let version = read_version(&mut cursor, CR)?;
    cursor.expect(LF, "LF after request line")?;

    let headers = read_headers(&mut cursor)?;
    let body = check_body(&headers, REQUIRED_REQUEST_HEADERS, cursor.remaining())?;

    Ok(HttpRequest {
        method: method.to_string(),
        target: target.to_string(),
        version,
        headers,
        body: body.to_vec(),
    })
}

/// Parse a server response frame.
pub fn parse_response(data: &[u8]) -> Result<HttpResponse, EnvelopeError> {
    let mut cursor = Cursor::new(data);

    let version = read_version(&mut cursor, SP)?;
    let code = cursor.read_until(SP, "status code")?;
    let status = code
        .parse::<u16>()
        .ok()
        .and_then(StatusCode::from_u16)
        .ok_or_else(|| EnvelopeError::bad_request(format!("invalid status code '{}'", code)))?;
    let reason = cursor.read_until(CR, "reason phrase")?;
    cursor.expect(LF, "LF after status line")?;

    let headers = read_headers(&mut cursor)?;
    let body = check_body(&headers, REQUIRED_RESPONSE_HEADERS, cursor.remaining())?;

    Ok(HttpResponse {
        version,
        status,
        reason: reason.to_string(),
        headers,
        body: body.to_vec(),
    })
}

fn read_version(cursor: &mut Cursor<'_>, delim: u8) -> Result<HttpVersion, EnvelopeError> {
    let token = cursor.read_until(delim, "HTTP version")?;
    let version = HttpVersion::parse(token)
        .ok_or_else(|| EnvelopeError::bad_request(format!("malformed version '{}'", token)))?;
    if !version.is_supported() {
        return Err(EnvelopeError::VersionNotSupported(token.to_string()));
    }
    Ok(version)
}

fn read_headers(cursor: &mut Cursor<'_>) -> Result<HeaderMap, EnvelopeError> {
    let mut headers = HeaderMap::new();

    while !cursor.at_crlf() {
        let name = cursor.read_until(COLON, "header name")?;
        if !headers::is_allowed(name) {
            return Err(EnvelopeError::bad_request(format!(
                "header '{}' not allowed",
                name
            )));
        }
        cursor.expect(SP, "single space after header name")?;
        let value = cursor.read_until(CR, "header value")?;
        cursor.expect(LF, "LF after header")?;
        headers.insert(name, value);
    }
    // blank line
    cursor.pos += 2;

    Ok(headers)
}

fn check_body<'a>(
    headers: &HeaderMap,
    required: &[&str],
    body: &'a [u8],
) -> Result<&'a [u8], EnvelopeError> {
    if let Some(missing) = required.iter().find(|name| !headers.contains(name)) {
        return Err(EnvelopeError::bad_request(format!(
            "missing header '{}'",
            missing
        )));
    }

    let content_type = headers.get("Content-Type").unwrap_or_default();
    if content_type != CONTENT_TYPE_XML {
        return Err(EnvelopeError::UnsupportedMediaType(content_type.to_string()));
    }

    let declared = headers.get("Content-Length").unwrap_or_default();
    let length = declared.parse::<usize>().map_err(|_| {
        EnvelopeError::bad_request(format!("invalid Content-Length '{}'", declared))
    })?;
    if length != body.len() {
        return Err(EnvelopeError::bad_request(format!(
            "Content-Length {} does not match body length {}",
            length,
            body.len()
        )));
    }

    Ok(body)
}
