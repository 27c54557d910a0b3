//! The recursive typed value exchanged by the protocol.
//!
//! - `codec`: XML-RPC tag vocabulary encoder/decoder
//! - `json`: bridge to `serde_json::Value`, used by the CLI

pub mod codec;
mod json;

use chrono::NaiveDateTime;
use indexmap::IndexMap;

use crate::error::MethodError;

pub use codec::{decode, decode_str, encode};

/// A single XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    DateTime(NaiveDateTime),
    /// Opaque bytes, base64 on the wire.
    Binary(Vec<u8>),
    /// Ordered members with unique names.
    Struct(IndexMap<String, Value>),
    Array(Vec<Value>),
}

/// Wrapper marking a byte buffer as `Value::Binary`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bytes(pub Vec<u8>);

impl Value {
    /// Name of the wire tag for this variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Integer(_) => "int",
            Value::Double(_) => "double",
            Value::Boolean(_) => "boolean",
            Value::DateTime(_) => "dateTime.iso8601",
            Value::Binary(_) => "base64",
            Value::Struct(_) => "struct",
            Value::Array(_) => "array",
        }
    }

    /// Build a struct from name/value pairs. Later duplicates overwrite
    /// earlier ones in place.
    pub fn structure<K, V, I>(members: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Struct(
            members
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Look up a struct member by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(members) => members.get(name),
            _ => None,
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Binary(v.0)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<IndexMap<String, T>> for Value {
    fn from(v: IndexMap<String, T>) -> Self {
        Value::Struct(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

/// Conversion out of a [`Value`], used to type-check method arguments.
///
/// A mismatch is reported as [`MethodError::InvalidParams`], which the
/// server answers with fault 3.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, MethodError>;
}

fn mismatch(expected: &str, found: &Value) -> MethodError {
    MethodError::invalid_params(format!(
        "expected {}, found {}",
        expected,
        found.type_name()
    ))
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, MethodError> {
        Ok(value)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, MethodError> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, MethodError> {
        match value {
            Value::Integer(i) => Ok(i),
            other => Err(mismatch("int", &other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self, MethodError> {
        match value {
            Value::Integer(i) => i32::try_from(i)
                .map_err(|_| MethodError::invalid_params(format!("{} out of i32 range", i))),
            other => Err(mismatch("int", &other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, MethodError> {
        match value {
            Value::Double(d) => Ok(d),
            Value::Integer(i) => Ok(i as f64),
            other => Err(mismatch("double", &other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, MethodError> {
        match value {
            Value::Boolean(b) => Ok(b),
            other => Err(mismatch("boolean", &other)),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self, MethodError> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            other => Err(mismatch("dateTime.iso8601", &other)),
        }
    }
}

impl FromValue for Bytes {
    fn from_value(value: Value) -> Result<Self, MethodError> {
        match value {
            Value::Binary(b) => Ok(Bytes(b)),
            other => Err(mismatch("base64", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, MethodError> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(mismatch("array", &other)),
        }
    }
}

impl<T: FromValue> FromValue for IndexMap<String, T> {
    fn from_value(value: Value) -> Result<Self, MethodError> {
        match value {
            Value::Struct(members) => members
                .into_iter()
                .map(|(k, v)| T::from_value(v).map(|v| (k, v)))
                .collect(),
            other => Err(mismatch("struct", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structure_keeps_first_position_on_duplicate() {
        let v = Value::structure([("a", 1), ("b", 2), ("a", 3)]);
        let Value::Struct(members) = v else {
            panic!("expected struct");
        };
        let keys: Vec<_> = members.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(members["a"], Value::Integer(3));
    }

    #[test]
    fn integer_widens_to_double() {
        assert_eq!(f64::from_value(Value::Integer(4)).unwrap(), 4.0);
    }

    #[test]
    fn type_mismatch_is_invalid_params() {
        let err = i64::from_value(Value::from("x")).unwrap_err();
        assert_eq!(
            err,
            MethodError::InvalidParams("expected int, found string".into())
        );
    }

    #[test]
    fn nested_vec_conversion() {
        let v = Value::from(vec![vec![1, 2], vec![3]]);
        let back: Vec<Vec<i64>> = FromValue::from_value(v).unwrap();
        assert_eq!(back, vec![vec![1, 2], vec![3]]);
    }

    #[test]
    fn i32_range_is_checked() {
        assert!(i32::from_value(Value::Integer(i64::MAX)).is_err());
        assert_eq!(i32::from_value(Value::Integer(-7)).unwrap(), -7);
    }
}
