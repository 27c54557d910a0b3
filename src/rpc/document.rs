//! XML-RPC request and response documents.
//!
//! Requests are `methodCall > (methodName, params > param* > value)`.
//! Responses are either `methodResponse > params > param > value` or
//! `methodResponse > fault > value > struct` with `faultCode` and
//! `faultString` members, in that order.

use roxmltree::{Document, Node};

use crate::error::DocumentError;
use crate::value::codec::{self, elements, escape_into, scalar_text, write_value};
use crate::value::Value;

const XML_DECLARATION: &str = r#"<?xml version="1.0"?>"#;

/// A decoded method call.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub params: Vec<Value>,
}

/// Fault codes carried in fault responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum FaultCode {
    /// Payload is not well-formed XML-RPC
    ParseError = 1,
    /// Method name not registered
    MethodNotFound = 2,
    /// Wrong parameter count or types
    InvalidParams = 3,
    /// The method failed while running
    InternalError = 4,
    /// Anything else
    Other = 5,
}

impl FaultCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::ParseError),
            2 => Some(Self::MethodNotFound),
            3 => Some(Self::InvalidParams),
            4 => Some(Self::InternalError),
            5 => Some(Self::Other),
            _ => None,
        }
    }

    /// Generic message sent to callers. Details stay in the server log.
    pub fn message(self) -> &'static str {
        match self {
            Self::ParseError => "Error parsing XML-RPC payload.",
            Self::MethodNotFound => "Requested method does not exist.",
            Self::InvalidParams => "Invalid parameters for the requested method.",
            Self::InternalError => "Internal error while executing the method.",
            Self::Other => "Other error.",
        }
    }
}

/// A structured, in-band error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: i32,
    pub message: String,
}

/// Outcome of a call as carried on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Success(Value),
    Fault(Fault),
}

impl Response {
    pub fn success(value: impl Into<Value>) -> Self {
        Response::Success(value.into())
    }

    /// Fault with the generic message for `code`.
    pub fn fault(code: FaultCode) -> Self {
        Response::Fault(Fault {
            code: code.code(),
            message: code.message().to_string(),
        })
    }

    pub fn parse_error() -> Self {
        Self::fault(FaultCode::ParseError)
    }

    pub fn method_not_found() -> Self {
        Self::fault(FaultCode::MethodNotFound)
    }

    pub fn invalid_params() -> Self {
        Self::fault(FaultCode::InvalidParams)
    }

    pub fn internal_error() -> Self {
        Self::fault(FaultCode::InternalError)
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Response::Fault(_))
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Response::Success(value) => build_response(value),
            Response::Fault(fault) => build_fault(fault.code, &fault.message),
        }
    }
}

/// Build a `methodCall` document.
pub fn build_request(method: &str, params: &[Value]) -> Vec<u8> {
    let mut out = String::from(XML_DECLARATION);
    out.push_str("<methodCall><methodName>");
    escape_into(method, &mut out);
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        write_value(param, &mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out.into_bytes()
}

/// Build a success `methodResponse` carrying one value.
pub fn build_response(value: &Value) -> Vec<u8> {
    let mut out = String::from(XML_DECLARATION);
    out.push_str("<methodResponse><params><param>");
    write_value(value, &mut out);
    out.push_str("</param></params></methodResponse>");
    out.into_bytes()
}

/// Build a fault `methodResponse`.
pub fn build_fault(code: i32, message: &str) -> Vec<u8> {
    let fault = Value::structure([
        ("faultCode", Value::Integer(code.into())),
        ("faultString", Value::from(message)),
    ]);

    let mut out = String::from(XML_DECLARATION);
    out.push_str("<methodResponse><fault>");
    write_value(&fault, &mut out);
    out.push_str("</fault></methodResponse>");
    out.into_bytes()
}

/// Parse a `methodCall` document.
pub fn parse_request(data: &[u8]) -> Result<Request, DocumentError> {
    let text = as_text(data)?;
    let doc = Document::parse(text)?;
    let root = doc.root_element();

    if root.tag_name().name() != "methodCall" {
        return Err(bad_request(format!(
            "root element is <{}>",
            root.tag_name().name()
        )));
    }

    let children: Vec<Node> = elements(root).collect();
    let [method_node, params_node] = children.as_slice() else {
        return Err(bad_request(format!(
            "<methodCall> has {} children, expected 2",
            children.len()
        )));
    };
    if method_node.tag_name().name() != "methodName" {
        return Err(bad_request("first child of <methodCall> must be <methodName>"));
    }
    if params_node.tag_name().name() != "params" {
        return Err(bad_request("second child of <methodCall> must be <params>"));
    }

    let method = scalar_text(*method_node)
        .map_err(|_| bad_request("<methodName> must be text"))?
        .to_string();

    let params = elements(*params_node)
        .map(|param| {
            let inner: Vec<Node> = elements(param).collect();
            match (param.tag_name().name(), inner.as_slice()) {
                ("param", [value]) if value.tag_name().name() == "value" => codec::decode(*value),
                _ => Err(bad_request("<params> children must be <param><value/></param>")),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Request { method, params })
}

/// Parse a `methodResponse` document.
pub fn parse_response(data: &[u8]) -> Result<Response, DocumentError> {
    let text = as_text(data)?;
    let doc = Document::parse(text)?;
    let root = doc.root_element();

    if root.tag_name().name() != "methodResponse" {
        return Err(bad_response(format!(
            "root element is <{}>",
            root.tag_name().name()
        )));
    }

    let children: Vec<Node> = elements(root).collect();
    let [body] = children.as_slice() else {
        return Err(bad_response(format!(
            "<methodResponse> has {} children, expected 1",
            children.len()
        )));
    };

    match body.tag_name().name() {
        "fault" => parse_fault(*body).map(Response::Fault),
        "params" => {
            let params: Vec<Node> = elements(*body).collect();
            let [param] = params.as_slice() else {
                return Err(bad_response("<params> must hold exactly one <param>"));
            };
            let value = single_value(*param)?;
            Ok(Response::Success(codec::decode(value)?))
        }
        other => Err(bad_response(format!("unexpected <{}>", other))),
    }
}

fn parse_fault(node: Node<'_, '_>) -> Result<Fault, DocumentError> {
    let value = single_value(node)?;
    let Value::Struct(members) = codec::decode(value)? else {
        return Err(bad_response("fault value must be a struct"));
    };
    if members.len() != 2 {
        return Err(bad_response("fault struct must have exactly two members"));
    }

    let code = match members.get("faultCode") {
        Some(Value::Integer(code)) => {
            i32::try_from(*code).map_err(|_| bad_response("faultCode out of range"))?
        }
        _ => return Err(bad_response("faultCode must be an int")),
    };
    let message = match members.get("faultString") {
        Some(Value::String(message)) => message.clone(),
        _ => return Err(bad_response("faultString must be a string")),
    };

    Ok(Fault { code, message })
}

/// The only child of `node`, which must be a `<value>`.
fn single_value<'a, 'input>(node: Node<'a, 'input>) -> Result<Node<'a, 'input>, DocumentError> {
    let inner: Vec<Node> = elements(node).collect();
    match inner.as_slice() {
        [value] if value.tag_name().name() == "value" => Ok(*value),
        _ => Err(bad_response(format!(
            "<{}> must hold exactly one <value>",
            node.tag_name().name()
        ))),
    }
}

fn as_text(data: &[u8]) -> Result<&str, DocumentError> {
    std::str::from_utf8(data).map_err(|e| DocumentError::Xml(e.to_string()))
}

fn bad_request(msg: impl Into<String>) -> DocumentError {
    DocumentError::MalformedRequest(msg.into())
}

fn bad_response(msg: impl Into<String>) -> DocumentError {
    DocumentError::MalformedResponse(msg.into())
}
