//! XML-RPC over plain TCP.
//!
//! One request per connection: the client connects, sends a single HTTP
//! POST carrying a `methodCall` document, reads the reply and the server
//! closes the socket.
//!
//! ## Architecture
//!
//! - `document`: `methodCall` / `methodResponse` documents and fault codes
//! - `transport`: framed reads and complete writes under a deadline
//! - `methods`: method table, typed registration and dispatch
//! - `server`: listener, per-connection tasks and graceful shutdown
//! - `client`: one-connection-per-call proxy

pub mod client;
pub mod document;
pub mod methods;
pub mod server;
pub mod transport;

pub use client::{RemoteMethod, RpcClient};
pub use document::{Fault, FaultCode, Request, Response};
pub use methods::{IntoMethod, Method, MethodTable};
pub use server::{RpcServer, ShutdownHandle};
