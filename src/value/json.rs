use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Number};

use super::Value;

impl From<serde_json::Value> for Value {
    /// `null` has no XML-RPC counterpart and becomes an empty string.
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::String(String::new()),
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(members) => {
                Value::Struct(members.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    /// Binary becomes a base64 string and datetimes their ISO form.
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => serde_json::Value::String(s),
            Value::Integer(i) => serde_json::Value::Number(i.into()),
            Value::Double(d) => Number::from_f64(d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Boolean(b) => serde_json::Value::Bool(b),
            Value::DateTime(dt) => {
                serde_json::Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string())
            }
            Value::Binary(bytes) => serde_json::Value::String(STANDARD.encode(bytes)),
            Value::Struct(members) => serde_json::Value::Object(
                members
                    .into_iter()
                    .map(|(k, v)| (k, v.into()))
                    .collect::<Map<_, _>>(),
            ),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_object_keeps_member_names() {
        let v = Value::from(json!({"a": 1, "b": [true, 2.5, "x"]}));
        assert_eq!(v.get("a"), Some(&Value::Integer(1)));
        assert_eq!(
            v.get("b"),
            Some(&Value::Array(vec![
                Value::Boolean(true),
                Value::Double(2.5),
                Value::from("x"),
            ]))
        );
    }

    #[test]
    fn binary_prints_as_base64() {
        let json: serde_json::Value = Value::Binary(b"hi".to_vec()).into();
        assert_eq!(json, json!("aGk="));
    }
}
