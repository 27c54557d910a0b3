//! Minimal XML-RPC server and client speaking HTTP/1.x over raw TCP.

pub mod builtin;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod rpc;
pub mod value;

pub use error::{ClientError, DocumentError, EnvelopeError, MethodError, ServerError, TransportError};
pub use rpc::{MethodTable, RpcClient, RpcServer};
pub use value::{Bytes, FromValue, Value};
