//! Demo methods served by `rawrpc serve`.
//!
//! Arithmetic stays integral while both operands are integers and falls
//! back to doubles otherwise.

use crate::error::MethodError;
use crate::rpc::MethodTable;
use crate::value::{FromValue, Value};

/// Integer or double operand.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl FromValue for Number {
    fn from_value(value: Value) -> Result<Self, MethodError> {
        match value {
            Value::Integer(i) => Ok(Number::Int(i)),
            Value::Double(d) => Ok(Number::Float(d)),
            other => Err(MethodError::invalid_params(format!(
                "expected number, found {}",
                other.type_name()
            ))),
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(i) => Value::Integer(i),
            Number::Float(f) => Value::Double(f),
        }
    }
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    /// Integer op when both sides are integers, double op otherwise.
    fn combine(
        self,
        other: Number,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<Number, MethodError> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => int_op(a, b)
                .map(Number::Int)
                .ok_or_else(|| MethodError::failed("integer overflow")),
            (a, b) => Ok(Number::Float(float_op(a.as_f64(), b.as_f64()))),
        }
    }
}

fn add(a: Number, b: Number) -> Result<Number, MethodError> {
    a.combine(b, i64::checked_add, |x, y| x + y)
}

fn multiply(a: Number, b: Number) -> Result<Number, MethodError> {
    a.combine(b, i64::checked_mul, |x, y| x * y)
}

fn divide(dividend: Number, divisor: Number) -> Result<f64, MethodError> {
    let divisor = divisor.as_f64();
    if divisor == 0.0 {
        return Err(MethodError::failed("division by zero"));
    }
    Ok(dividend.as_f64() / divisor)
}

fn pow(base: Number, exp: Number) -> Result<Number, MethodError> {
    match (base, exp) {
        (Number::Int(b), Number::Int(e)) if e >= 0 => {
            let e = u32::try_from(e).map_err(|_| MethodError::failed("integer overflow"))?;
            b.checked_pow(e)
                .map(Number::Int)
                .ok_or_else(|| MethodError::failed("integer overflow"))
        }
        (b, e) => Ok(Number::Float(b.as_f64().powf(e.as_f64()))),
    }
}

fn dot_prod(v1: Vec<Number>, v2: Vec<Number>) -> Result<Number, MethodError> {
    if v1.len() != v2.len() {
        return Err(MethodError::invalid_params(format!(
            "vector lengths differ: {} and {}",
            v1.len(),
            v2.len()
        )));
    }
    v1.into_iter()
        .zip(v2)
        .try_fold(Number::Int(0), |acc, (a, b)| add(acc, multiply(a, b)?))
}

fn replace(text: String, from: String, to: String) -> Result<Value, MethodError> {
    if from.is_empty() {
        return Err(MethodError::invalid_params("pattern must not be empty"));
    }
    let occurrences = text.matches(from.as_str()).count() as i64;
    Ok(Value::structure([
        ("replaced", Value::from(text.replace(&from, &to))),
        ("occurrences", Value::from(occurrences)),
    ]))
}

/// Table holding every demo method.
pub fn methods() -> MethodTable {
    let mut table = MethodTable::new();
    table.add_method("add", add);
    table.add_method("multiply", multiply);
    table.add_method("divide", divide);
    table.add_method("pow", pow);
    table.add_method("dot_prod", dot_prod);
    table.add_method("replace", replace);
    table.add_method("echo", |v: Value| -> Result<Value, MethodError> { Ok(v) });
    table.add_method("pi", || -> Result<f64, MethodError> { Ok(std::f64::consts::PI) });
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::Response;

    async fn call(name: &str, params: Vec<Value>) -> Response {
        methods().dispatch(name, params).await
    }

    fn fault_code(resp: &Response) -> i32 {
        match resp {
            Response::Fault(f) => f.code,
            Response::Success(v) => panic!("expected fault, got {:?}", v),
        }
    }

    #[tokio::test]
    async fn add_keeps_integers_integral() {
        assert_eq!(
            call("add", crate::params![1, 2]).await,
            Response::Success(Value::Integer(3))
        );
        assert_eq!(
            call("add", crate::params![1, 0.5]).await,
            Response::Success(Value::Double(1.5))
        );
    }

    #[tokio::test]
    async fn divide_by_zero_is_fault_4() {
        assert_eq!(fault_code(&call("divide", crate::params![5, 0]).await), 4);
        assert_eq!(
            call("divide", crate::params![5, 2]).await,
            Response::Success(Value::Double(2.5))
        );
    }

    #[tokio::test]
    async fn add_rejects_strings() {
        assert_eq!(fault_code(&call("add", crate::params!["1", 2]).await), 3);
    }

    #[tokio::test]
    async fn pow_integer_and_fractional() {
        assert_eq!(
            call("pow", crate::params![2, 10]).await,
            Response::Success(Value::Integer(1024))
        );
        assert_eq!(
            call("pow", crate::params![4, 0.5]).await,
            Response::Success(Value::Double(2.0))
        );
        assert_eq!(fault_code(&call("pow", crate::params![10, 40]).await), 4);
    }

    #[tokio::test]
    async fn dot_product() {
        let resp = call("dot_prod", crate::params![vec![1, 2, 3], vec![4, 5, 6]]).await;
        assert_eq!(resp, Response::Success(Value::Integer(32)));

        let resp = call("dot_prod", crate::params![vec![1, 2], vec![1]]).await;
        assert_eq!(fault_code(&resp), 3);
    }

    #[tokio::test]
    async fn replace_counts_occurrences() {
        let resp = call("replace", crate::params!["banana", "a", "o"]).await;
        let Response::Success(value) = resp else {
            panic!("expected success");
        };
        assert_eq!(value.get("replaced"), Some(&Value::from("bonono")));
        assert_eq!(value.get("occurrences"), Some(&Value::Integer(3)));
    }

    #[tokio::test]
    async fn echo_and_pi() {
        let nested = Value::structure([("k", vec![true, false])]);
        assert_eq!(
            call("echo", vec![nested.clone()]).await,
            Response::Success(nested)
        );
        assert_eq!(
            call("pi", vec![]).await,
            Response::Success(Value::Double(std::f64::consts::PI))
        );
    }
}
