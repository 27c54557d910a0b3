//! Encoder and decoder for the XML-RPC value vocabulary.
//!
//! Encoding always emits a typed child tag inside `<value>`. Decoding is
//! strict about shape: a `value` element has exactly one recognized child
//! element, or none at all (a bare text scalar).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, NaiveDateTime};
use indexmap::IndexMap;
use roxmltree::{Document, Node};

use super::Value;
use crate::error::DocumentError;

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const DATETIME_COMPACT_FORMAT: &str = "%Y%m%dT%H:%M:%S";

/// Encode a value as a `<value>` element.
pub fn encode(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

pub(crate) fn write_value(value: &Value, out: &mut String) {
    out.push_str("<value>");
    match value {
        Value::String(s) => {
            out.push_str("<string>");
            escape_into(s, out);
            out.push_str("</string>");
        }
        Value::Integer(i) => {
            out.push_str("<int>");
            out.push_str(&i.to_string());
            out.push_str("</int>");
        }
        Value::Boolean(b) => {
            out.push_str("<boolean>");
            out.push_str(if *b { "true" } else { "false" });
            out.push_str("</boolean>");
        }
        Value::Double(d) => {
            out.push_str("<double>");
            out.push_str(&format!("{:?}", d));
            out.push_str("</double>");
        }
        Value::DateTime(dt) => {
            out.push_str("<dateTime.iso8601>");
            out.push_str(&dt.format(DATETIME_FORMAT).to_string());
            out.push_str("</dateTime.iso8601>");
        }
        Value::Binary(bytes) => {
            out.push_str("<base64>");
            out.push_str(&STANDARD.encode(bytes));
            out.push_str("</base64>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                escape_into(name, out);
                out.push_str("</name>");
                write_value(member, out);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(item, out);
            }
            out.push_str("</data></array>");
        }
    }
    out.push_str("</value>");
}

/// Escape the characters that would otherwise break element text.
pub(crate) fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            // a literal CR would be normalized to LF by the parser
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
}

/// Decode a standalone `<value>` document.
pub fn decode_str(text: &str) -> Result<Value, DocumentError> {
    let doc = Document::parse(text)?;
    decode(doc.root_element())
}

/// Decode a parsed `value` element.
pub fn decode(node: Node<'_, '_>) -> Result<Value, DocumentError> {
    if node.tag_name().name() != "value" {
        return Err(malformed(format!(
            "expected <value>, found <{}>",
            node.tag_name().name()
        )));
    }

    let children: Vec<Node> = elements(node).collect();
    match children.as_slice() {
        [] => Ok(Value::String(node.text().unwrap_or_default().to_string())),
        [typed] => decode_typed(*typed),
        _ => Err(malformed(format!(
            "<value> has {} child elements",
            children.len()
        ))),
    }
}

fn decode_typed(node: Node<'_, '_>) -> Result<Value, DocumentError> {
    match node.tag_name().name() {
        "struct" => decode_struct(node),
        "array" => decode_array(node),
        "string" => Ok(Value::String(scalar_text(node)?.to_string())),
        "int" | "i4" => {
            let text = scalar_text(node)?;
            text.trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| malformed(format!("invalid int '{}'", text)))
        }
        "boolean" => match scalar_text(node)?.trim() {
            "true" | "1" => Ok(Value::Boolean(true)),
            "false" | "0" => Ok(Value::Boolean(false)),
            other => Err(malformed(format!("invalid boolean '{}'", other))),
        },
        "double" => {
            let text = scalar_text(node)?;
            text.trim()
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| malformed(format!("invalid double '{}'", text)))
        }
        "dateTime.iso8601" => parse_datetime(scalar_text(node)?.trim()).map(Value::DateTime),
        "base64" => {
            let cleaned: String = scalar_text(node)?
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            STANDARD
                .decode(cleaned)
                .map(Value::Binary)
                .map_err(|e| malformed(format!("invalid base64: {}", e)))
        }
        other => Err(malformed(format!("unknown value tag <{}>", other))),
    }
}

fn decode_struct(node: Node<'_, '_>) -> Result<Value, DocumentError> {
    let mut members = IndexMap::new();

    for member in elements(node) {
        if member.tag_name().name() != "member" {
            return Err(malformed(format!(
                "unexpected <{}> in <struct>",
                member.tag_name().name()
            )));
        }

        let parts: Vec<Node> = elements(member).collect();
        let name = parts.iter().find(|n| n.tag_name().name() == "name");
        let value = parts.iter().find(|n| n.tag_name().name() == "value");
        let (Some(name), Some(value), 2) = (name, value, parts.len()) else {
            return Err(malformed("<member> needs exactly one <name> and one <value>"));
        };

        let name = scalar_text(*name)?.to_string();
        members.insert(name, decode(*value)?);
    }

    Ok(Value::Struct(members))
}

fn decode_array(node: Node<'_, '_>) -> Result<Value, DocumentError> {
    let children: Vec<Node> = elements(node).collect();
    let [data] = children.as_slice() else {
        return Err(malformed("<array> needs exactly one <data> child"));
    };
    if data.tag_name().name() != "data" {
        return Err(malformed("<array> needs exactly one <data> child"));
    }

    elements(*data)
        .map(|item| {
            if item.tag_name().name() != "value" {
                return Err(malformed(format!(
                    "unexpected <{}> in <data>",
                    item.tag_name().name()
                )));
            }
            decode(item)
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn parse_datetime(text: &str) -> Result<NaiveDateTime, DocumentError> {
    NaiveDateTime::parse_from_str(text, DATETIME_COMPACT_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| DateTime::parse_from_rfc3339(text).map(|dt| dt.naive_local()))
        .map_err(|_| malformed(format!("invalid dateTime.iso8601 '{}'", text)))
}

/// Text of an element that must not contain child elements.
pub(crate) fn scalar_text<'a>(node: Node<'a, '_>) -> Result<&'a str, DocumentError> {
    if elements(node).next().is_some() {
        return Err(malformed(format!(
            "<{}> must contain only text",
            node.tag_name().name()
        )));
    }
    Ok(node.text().unwrap_or_default())
}

/// Element children, skipping whitespace text and comments.
pub(crate) fn elements<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn malformed(msg: impl Into<String>) -> DocumentError {
    DocumentError::MalformedValue(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn roundtrip(v: &Value) -> Value {
        decode_str(&encode(v)).unwrap()
    }

    #[test]
    fn encodes_scalars() {
        assert_eq!(encode(&Value::Integer(3)), "<value><int>3</int></value>");
        assert_eq!(
            encode(&Value::Boolean(true)),
            "<value><boolean>true</boolean></value>"
        );
        assert_eq!(encode(&Value::Double(1.5)), "<value><double>1.5</double></value>");
        assert_eq!(
            encode(&Value::Binary(b"hi".to_vec())),
            "<value><base64>aGk=</base64></value>"
        );
    }

    #[test]
    fn escapes_markup_in_strings() {
        let v = Value::from("a < b && c > d");
        assert_eq!(
            encode(&v),
            "<value><string>a &lt; b &amp;&amp; c &gt; d</string></value>"
        );
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn carriage_returns_survive() {
        let v = Value::from("a\r\nb\rc");
        assert_eq!(encode(&v), "<value><string>a&#13;\nb&#13;c</string></value>");
        assert_eq!(roundtrip(&v), v);

        let member = Value::structure([("x\ry", 1)]);
        assert_eq!(roundtrip(&member), member);
    }

    #[test]
    fn bare_text_is_string() {
        assert_eq!(
            decode_str("<value>hello</value>").unwrap(),
            Value::from("hello")
        );
        assert_eq!(decode_str("<value></value>").unwrap(), Value::from(""));
    }

    #[test]
    fn accepts_i4_and_numeric_booleans() {
        assert_eq!(
            decode_str("<value><i4>-12</i4></value>").unwrap(),
            Value::Integer(-12)
        );
        assert_eq!(
            decode_str("<value><boolean>0</boolean></value>").unwrap(),
            Value::Boolean(false)
        );
    }

    #[test]
    fn accepts_compact_datetime() {
        let expected = NaiveDate::from_ymd_opt(1998, 7, 17)
            .unwrap()
            .and_hms_opt(14, 8, 55)
            .unwrap();
        assert_eq!(
            decode_str("<value><dateTime.iso8601>19980717T14:08:55</dateTime.iso8601></value>")
                .unwrap(),
            Value::DateTime(expected)
        );
    }

    #[test]
    fn decodes_nested_struct_with_whitespace() {
        let xml = r#"<value>
            <struct>
              <member><name>xs</name><value><array><data>
                <value><int>1</int></value>
                <value><string>two</string></value>
              </data></array></value></member>
              <member><name>ok</name><value><boolean>true</boolean></value></member>
            </struct>
          </value>"#;

        let v = decode_str(xml).unwrap();
        assert_eq!(
            v.get("xs"),
            Some(&Value::Array(vec![Value::Integer(1), Value::from("two")]))
        );
        assert_eq!(v.get("ok"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn rejects_malformed_shapes() {
        let cases = [
            "<value><int>1</int><int>2</int></value>",
            "<value><float>1.0</float></value>",
            "<value><int>abc</int></value>",
            "<value><boolean>yes</boolean></value>",
            "<value><base64>!!!not base64</base64></value>",
            "<value><struct><member><name>a</name></member></struct></value>",
            "<value><struct><member><name>a</name><value>1</value><value>2</value></member></struct></value>",
            "<value><struct><item/></struct></value>",
            "<value><array><value>1</value></array></value>",
            "<value><array><data><int>1</int></data></array></value>",
            "<value><array><data/><data/></array></value>",
            "<value><string><b>x</b></string></value>",
        ];

        for case in cases {
            assert!(
                matches!(decode_str(case), Err(DocumentError::MalformedValue(_))),
                "accepted {}",
                case
            );
        }
    }

    #[test]
    fn base64_allows_line_wrapping() {
        assert_eq!(
            decode_str("<value><base64>aG\n  k=</base64></value>").unwrap(),
            Value::Binary(b"hi".to_vec())
        );
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            // XML cannot carry most control characters.
            "[\t\n\r\x20-\x7e\u{a0}-\u{d7ff}]{0,24}".prop_map(Value::String),
            any::<i64>().prop_map(Value::Integer),
            (-1.0e12f64..1.0e12f64).prop_map(Value::Double),
            any::<bool>().prop_map(Value::Boolean),
            (0i64..4_000_000_000i64).prop_map(|secs| {
                Value::DateTime(DateTime::from_timestamp(secs, 0).unwrap().naive_utc())
            }),
            proptest::collection::vec(any::<u8>(), 0..32).prop_map(Value::Binary),
        ];
        leaf.prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                proptest::collection::vec(("[a-zA-Z_][a-zA-Z0-9_]{0,8}", inner), 0..6)
                    .prop_map(Value::structure),
            ]
        })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(v in arb_value()) {
            prop_assert_eq!(roundtrip(&v), v);
        }
    }
}
