//! Error types for each layer of the stack.
//!
//! Failures are isolated per layer: a transport error only aborts the
//! connection it happened on, an envelope error becomes an HTTP status, a
//! document error becomes fault 1, and method errors become faults 3 and 4.

use thiserror::Error;

use crate::http::StatusCode;

/// Socket level failure. Timeouts are not represented here; they return
/// whatever was accumulated instead.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to send data: {0}")]
    Send(#[source] std::io::Error),

    #[error("failed to receive data: {0}")]
    Receive(#[source] std::io::Error),
}

/// Non-conforming HTTP framing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("HTTP version not supported: {0}")]
    VersionNotSupported(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
}

impl EnvelopeError {
    pub(crate) fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest(reason.into())
    }

    /// HTTP status the server answers with for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::VersionNotSupported(_) => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        }
    }
}

/// Structurally invalid XML-RPC payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("payload is not valid XML: {0}")]
    Xml(String),

    #[error("malformed value: {0}")]
    MalformedValue(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<roxmltree::Error> for DocumentError {
    fn from(err: roxmltree::Error) -> Self {
        DocumentError::Xml(err.to_string())
    }
}

/// Error raised by a registered method.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MethodError {
    /// Wrong argument count or types. Answered with fault 3.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// The method failed while running. Answered with fault 4.
    #[error("method failed: {0}")]
    Failed(String),
}

impl MethodError {
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Error returned by [`crate::rpc::RpcClient`] calls.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("method name must not be empty")]
    InvalidMethodName,

    #[error("failed to connect to server: {0}")]
    Connect(#[source] std::io::Error),

    #[error("communication error: {0}")]
    Transport(#[from] TransportError),

    /// The reply could not be read as an RPC response at all.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// The server answered with a fault.
    #[error("RPC fault {code}: {message}")]
    Fault { code: i32, message: String },
}

impl ClientError {
    /// Fault code carried by this error, `0` for local failures.
    pub fn code(&self) -> i32 {
        match self {
            ClientError::Fault { code, .. } => *code,
            _ => 0,
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        ClientError::Protocol {
            message: message.into(),
        }
    }
}

/// Server setup failure.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),
}
