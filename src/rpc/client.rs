//! RPC client.
//!
//! Every call opens its own connection, sends one framed request, reads
//! one framed response and closes. There is no pooling and no retry.

use tokio::net::TcpStream;
use tracing::{debug, warn};

use super::document::{self, Response};
use super::transport::{receive_framed, send_all};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::http::{self, wrap_request};
use crate::value::{FromValue, Value};

/// Build a parameter list from anything convertible into [`Value`].
///
/// ```
/// let params = rawrpc::params![1, "two", 3.0];
/// assert_eq!(params.len(), 3);
/// ```
#[macro_export]
macro_rules! params {
    ($($arg:expr),* $(,)?) => {
        vec![$($crate::value::Value::from($arg)),*]
    };
}

/// RPC client for a single server.
#[derive(Debug, Clone)]
pub struct RpcClient {
    config: ClientConfig,
}

/// A remote method bound to a client, callable like a local function.
pub struct RemoteMethod<'a> {
    client: &'a RpcClient,
    name: String,
}

impl RemoteMethod<'_> {
    pub async fn call<T: FromValue>(&self, params: Vec<Value>) -> Result<T, ClientError> {
        self.client.call(&self.name, params).await
    }
}

impl RpcClient {
    /// Client for `host:port` with default timeouts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_config(ClientConfig {
            host: host.into(),
            port,
            ..ClientConfig::default()
        })
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Handle for the remote method `name`.
    pub fn method(&self, name: impl Into<String>) -> RemoteMethod<'_> {
        RemoteMethod {
            client: self,
            name: name.into(),
        }
    }

    /// Call `method` with positional `params` and convert the result.
    ///
    /// A fault reply becomes [`ClientError::Fault`]; a reply that cannot be
    /// read as an RPC response becomes [`ClientError::Protocol`].
    pub async fn call<T: FromValue>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, ClientError> {
        if method.is_empty() {
            return Err(ClientError::InvalidMethodName);
        }

        let host = format!("{}:{}", self.config.host, self.config.port);
        let document = document::build_request(method, &params);
        let frame = wrap_request(&document, &host, &self.config.user_agent);

        let raw = self.round_trip(&host, &frame).await?;

        let response = http::parse_response(&raw)
            .map_err(|e| ClientError::protocol(format!("invalid response envelope: {}", e)))?;
        if !response.status.is_success() {
            return Err(ClientError::protocol(format!(
                "server answered {}",
                response.status
            )));
        }

        match document::parse_response(&response.body)
            .map_err(|e| ClientError::protocol(format!("response is not XML-RPC: {}", e)))?
        {
            Response::Fault(fault) => {
                debug!(method, code = fault.code, "Call returned fault");
                Err(ClientError::Fault {
                    code: fault.code,
                    message: fault.message,
                })
            }
            Response::Success(value) => T::from_value(value)
                .map_err(|e| ClientError::protocol(format!("unexpected result type: {}", e))),
        }
    }

    async fn round_trip(&self, host: &str, frame: &[u8]) -> Result<Vec<u8>, ClientError> {
        let mut stream = TcpStream::connect(host)
            .await
            .map_err(ClientError::Connect)?;

        let sent = send_all(&mut stream, frame, self.config.send_timeout()).await?;
        if sent < frame.len() {
            warn!(sent, total = frame.len(), "Request truncated by send timeout");
        }

        let raw = receive_framed(
            &mut stream,
            self.config.chunk_size,
            self.config.response_timeout(),
        )
        .await?;
        if raw.is_empty() {
            return Err(ClientError::protocol("no response received"));
        }

        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_method_name_is_rejected() {
        let client = RpcClient::new("127.0.0.1", 1);
        let err = client.call::<Value>("", vec![]).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidMethodName));
        assert_eq!(err.code(), 0);
    }

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        // bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = RpcClient::new("127.0.0.1", port);
        let err = client.call::<Value>("add", params![1, 2]).await.unwrap_err();
        assert!(matches!(err, ClientError::Connect(_)));
    }

    #[test]
    fn params_macro_converts() {
        let p = params![1, "x", true, vec![1.5]];
        assert_eq!(
            p,
            vec![
                Value::Integer(1),
                Value::from("x"),
                Value::Boolean(true),
                Value::Array(vec![Value::Double(1.5)]),
            ]
        );
    }
}
