//! TCP server: accept loop plus one task per connection.
//!
//! Each connection carries exactly one request. The handler reads a frame,
//! answers it, and closes the socket. The method table is frozen when
//! [`RpcServer::serve`] starts and shared read-only by all handlers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream, lookup_host};
use tokio::sync::broadcast;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::document::{self, Response};
use super::methods::{IntoMethod, Method, MethodTable};
use super::transport::{receive_framed, send_all};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::http::{self, StatusCode, wrap_response};

/// Per-connection settings copied out of [`ServerConfig`].
struct ConnectionSettings {
    chunk_size: usize,
    io_timeout: Duration,
    server_name: String,
}

/// XML-RPC server bound to a listening socket.
pub struct RpcServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    methods: MethodTable,
    settings: ConnectionSettings,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
}

/// Cloneable handle that stops a running server.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
    /// Stop accepting. In-flight handlers finish their reply first.
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }
}

impl RpcServer {
    /// Bind and listen on `config.host:config.port` with `config.backlog`.
    pub async fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        let address = config.address();
        let addr = lookup_host(&address)
            .await
            .map_err(|source| ServerError::Bind {
                addr: address.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| ServerError::InvalidAddress(address.clone()))?;

        let bind_err = |source: std::io::Error| ServerError::Bind {
            addr: address.clone(),
            source,
        };
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;
        socket.set_reuseaddr(true).map_err(bind_err)?;
        socket.bind(addr).map_err(bind_err)?;
        let listener = socket.listen(config.backlog).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        info!(addr = %local_addr, backlog = config.backlog, "RPC server listening");

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        Ok(Self {
            listener,
            local_addr,
            methods: MethodTable::new(),
            settings: ConnectionSettings {
                chunk_size: config.chunk_size,
                io_timeout: config.io_timeout(),
                server_name: config.server_name.clone(),
            },
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Address actually bound, useful with port `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Register a typed function under `name`.
    pub fn add_method<Args, F>(&mut self, name: impl Into<String>, f: F)
    where
        F: IntoMethod<Args>,
    {
        let name = name.into();
        debug!(method = %name, "Registering method");
        self.methods.add_method(name, f);
    }

    /// Register a hand-written [`Method`] under `name`.
    pub fn add_raw(&mut self, name: impl Into<String>, method: Arc<dyn Method>) {
        self.methods.add_raw(name, method);
    }

    /// Merge every method of `table` into this server.
    pub fn add_methods(&mut self, table: &MethodTable) {
        for name in table.names() {
            if let Some(method) = table.get(name) {
                self.methods.add_raw(name, method);
            }
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Accept connections until shut down, then close the listening socket
    /// and wait for every spawned handler to finish.
    pub async fn serve(self) -> Result<(), ServerError> {
        let RpcServer {
            listener,
            local_addr,
            methods,
            settings,
            // held so `recv` only ends on an explicit shutdown
            shutdown_tx: _shutdown_tx,
            mut shutdown_rx,
        } = self;

        let methods = Arc::new(methods);
        let settings = Arc::new(settings);
        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            debug!(peer = %peer_addr, "Client connected");
                            let span = info_span!(
                                "connection",
                                conn_id = %Uuid::now_v7(),
                                peer = %peer_addr
                            );
                            let methods = methods.clone();
                            let settings = settings.clone();
                            tracker.spawn(
                                handle_connection(stream, methods, settings).instrument(span),
                            );
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!(addr = %local_addr, "RPC server shutting down");
                    break;
                }
            }
        }

        drop(listener);
        tracker.close();
        if !tracker.is_empty() {
            info!(pending = tracker.len(), "Waiting for in-flight connections");
        }
        tracker.wait().await;
        info!("RPC server stopped");

        Ok(())
    }
}

/// Handle a single connection: one request, one reply, close.
async fn handle_connection(
    mut stream: TcpStream,
    methods: Arc<MethodTable>,
    settings: Arc<ConnectionSettings>,
) {
    let raw = match receive_framed(&mut stream, settings.chunk_size, settings.io_timeout).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Connection error");
            return;
        }
    };

    let (status, body) = answer(&raw, &methods).await;
    let reply = wrap_response(&body, status, &settings.server_name);

    match send_all(&mut stream, &reply, settings.io_timeout).await {
        Ok(sent) if sent < reply.len() => {
            warn!(sent, total = reply.len(), "Reply truncated by send timeout");
        }
        Ok(_) => debug!(status = status.as_u16(), "Reply sent"),
        Err(e) => {
            warn!(error = %e, "Connection error");
            return;
        }
    }

    let _ = stream.shutdown().await;
    debug!("Client disconnected");
}

/// Turn one raw request frame into a status and a response body.
///
/// Envelope failures yield their HTTP status with an empty body; anything
/// past the envelope is a 200 carrying either a result or a fault.
pub(crate) async fn answer(raw: &[u8], methods: &MethodTable) -> (StatusCode, Vec<u8>) {
    let request = match http::parse_request(raw) {
        Ok(request) => request,
        Err(e) => {
            warn!(status = e.status().as_u16(), error = %e, "Rejected request envelope");
            return (e.status(), Vec::new());
        }
    };

    let call = match document::parse_request(&request.body) {
        Ok(call) => call,
        Err(e) => {
            warn!(error = %e, "Malformed request document");
            return (StatusCode::OK, Response::parse_error().encode());
        }
    };

    debug!(method = %call.method, params = call.params.len(), "Dispatching");
    let response = methods.dispatch(&call.method, call.params).await;
    if let Response::Fault(fault) = &response {
        debug!(method = %call.method, fault_code = fault.code, "Answering with fault");
    }

    (StatusCode::OK, response.encode())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MethodError;
    use crate::http::wrap_request;
    use crate::rpc::document::{build_request, parse_response};
    use crate::value::Value;

    fn table() -> MethodTable {
        let mut table = MethodTable::new();
        table.add_method("add", |a: i64, b: i64| -> Result<i64, MethodError> { Ok(a + b) });
        table
    }

    #[tokio::test]
    async fn answers_valid_call() {
        let doc = build_request("add", &[Value::Integer(2), Value::Integer(3)]);
        let raw = wrap_request(&doc, "h", "ua");

        let (status, body) = answer(&raw, &table()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            parse_response(&body).unwrap(),
            Response::Success(Value::Integer(5))
        );
    }

    #[tokio::test]
    async fn bad_envelope_has_empty_body() {
        let raw = b"GET / HTTP/1.1\r\n\r\n";
        let (status, body) = answer(raw, &table()).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn bad_document_is_fault_1() {
        let raw = wrap_request(b"<methodCall><oops/></methodCall>", "h", "ua");
        let (status, body) = answer(&raw, &table()).await;
        assert_eq!(status, StatusCode::OK);
        let Response::Fault(fault) = parse_response(&body).unwrap() else {
            panic!("expected fault");
        };
        assert_eq!(fault.code, 1);
    }

    #[tokio::test]
    async fn shutdown_before_any_connection_returns() {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        let server = RpcServer::bind(&config).await.unwrap();
        let handle = server.shutdown_handle();
        handle.shutdown();

        tokio::time::timeout(Duration::from_secs(2), server.serve())
            .await
            .expect("serve did not stop")
            .unwrap();
    }
}
