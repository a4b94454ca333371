//! Sandboxed evaluation of predicate expressions.
//!
//! Evaluation is total: it reads from the options map and nothing else, has
//! no side effects, and every type mismatch resolves to a value (usually
//! `null` or `false`) instead of an error.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::predicate::expr::{BinaryOp, Expr, PathSegment};
use crate::value::{is_truthy, json_equal};

/// Evaluates `expr` against the current option values.
pub(crate) fn evaluate(expr: &Expr, options: &Map<String, Value>) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Path(segments) => resolve(options, segments),
        Expr::Not(inner) => Value::Bool(!is_truthy(&evaluate(inner, options))),
        Expr::Neg(inner) => match evaluate(inner, options).as_f64() {
            Some(n) => serde_json::Number::from_f64(-n).map_or(Value::Null, Value::Number),
            None => Value::Null,
        },
        Expr::Binary { op, lhs, rhs } => {
            let left = evaluate(lhs, options);
            match op {
                // Short-circuiting, returning the deciding operand.
                BinaryOp::Or if is_truthy(&left) => left,
                BinaryOp::Or => evaluate(rhs, options),
                BinaryOp::And if !is_truthy(&left) => left,
                BinaryOp::And => evaluate(rhs, options),
                _ => {
                    let right = evaluate(rhs, options);
                    Value::Bool(compare(*op, &left, &right))
                }
            }
        }
    }
}

fn resolve(options: &Map<String, Value>, segments: &[PathSegment]) -> Value {
    let Some((first, rest)) = segments.split_first() else {
        return Value::Object(options.clone());
    };
    let mut current = match first {
        PathSegment::Key(key) => match options.get(key) {
            Some(value) => value,
            None => return Value::Null,
        },
        PathSegment::Index(_) => return Value::Null,
    };
    for segment in rest {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => match map.get(key) {
                Some(value) => value,
                None => return Value::Null,
            },
            (PathSegment::Key(key), Value::Array(items)) if key == "length" => {
                return Value::from(items.len())
            }
            (PathSegment::Key(key), Value::String(s)) if key == "length" => {
                return Value::from(s.chars().count())
            }
            (PathSegment::Index(index), Value::Array(items)) => match items.get(*index) {
                Some(value) => value,
                None => return Value::Null,
            },
            _ => return Value::Null,
        };
    }
    current.clone()
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> bool {
    match op {
        BinaryOp::Eq | BinaryOp::StrictEq => json_equal(left, right),
        BinaryOp::NotEq | BinaryOp::StrictNotEq => !json_equal(left, right),
        BinaryOp::Lt => ordering(left, right) == Some(Ordering::Less),
        BinaryOp::Le => matches!(ordering(left, right), Some(Ordering::Less | Ordering::Equal)),
        BinaryOp::Gt => ordering(left, right) == Some(Ordering::Greater),
        BinaryOp::Ge => matches!(
            ordering(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        BinaryOp::Or | BinaryOp::And => false,
    }
}

/// Numbers order numerically, strings lexically; anything else is unordered.
fn ordering(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("options must be an object"),
        }
    }

    #[test]
    fn test_missing_path_is_null() {
        let opts = options(json!({"a": {"b": 1}}));

        assert_eq!(resolve(&opts, &[PathSegment::Key("zzz".into())]), Value::Null);
        assert_eq!(
            resolve(
                &opts,
                &[PathSegment::Key("a".into()), PathSegment::Key("c".into())]
            ),
            Value::Null
        );
    }

    #[test]
    fn test_length_of_arrays_and_strings() {
        let opts = options(json!({"list": [1, 2, 3], "name": "héllo"}));

        let list_len = Expr::option("list").key("length");
        let name_len = Expr::option("name").key("length");

        assert_eq!(evaluate(&list_len, &opts), json!(3));
        assert_eq!(evaluate(&name_len, &opts), json!(5));
    }

    #[test]
    fn test_or_returns_deciding_operand() {
        let opts = options(json!({"a": 0, "b": "fallback"}));

        let expr = Expr::option("a").or(Expr::option("b"));

        assert_eq!(evaluate(&expr, &opts), json!("fallback"));
    }

    #[test]
    fn test_mixed_type_ordering_is_false() {
        let opts = options(json!({"a": "10"}));

        assert_eq!(evaluate(&Expr::option("a").gt(5), &opts), json!(false));
        assert_eq!(evaluate(&Expr::option("a").le(5), &opts), json!(false));
    }

    #[test]
    fn test_string_ordering() {
        let opts = options(json!({"a": "apple"}));

        assert_eq!(evaluate(&Expr::option("a").lt("banana"), &opts), json!(true));
    }

    #[test]
    fn test_negation_of_non_number_is_null() {
        let opts = options(json!({"a": "x", "n": 2}));

        assert_eq!(evaluate(&Expr::Neg(Box::new(Expr::option("a"))), &opts), Value::Null);
        assert_eq!(evaluate(&Expr::Neg(Box::new(Expr::option("n"))), &opts), json!(-2.0));
    }
}
