//! HTTP envelope around RPC documents.
//!
//! Only the subset needed to carry one XML payload per connection:
//! `POST` requests, a fixed header whitelist, `text/xml` bodies with an
//! exact `Content-Length`. No keep-alive, chunking or compression.
//!
//! - `parser`: cursor-based request/response parsing
//! - `message`: request/response types and outbound wrapping
//! - `headers`: whitelist and ordered header map
//! - `status`: status codes and reason phrases

pub mod headers;
mod message;
mod parser;
mod status;

pub use headers::HeaderMap;
pub use message::{HttpRequest, HttpResponse, HttpVersion, wrap_request, wrap_response};
pub use parser::{parse_request, parse_response};
pub use status::StatusCode;
