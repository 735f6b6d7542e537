//! Binary operators over runtime values.
//!
//! Arithmetic and comparisons are loose: numeric strings, booleans and
//! `null` take part as numbers, and mixed-type comparisons fall back to
//! string or truthiness comparison.

use std::cmp::Ordering;

use crate::lang::operator::Operator;
use crate::lang::value::Value;
use crate::runtime::runtime_error::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(n) => n,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Num::Int(n) => n == 0,
            Num::Float(n) => n == 0.0,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Num::Int(n) => Value::Int(n),
            Num::Float(n) => Value::Float(n),
        }
    }
}

/// Apply `op` to already evaluated operands.
pub fn apply(op: Operator, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let value = match op {
        Operator::Add => {
            if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
                Value::Str(format!("{}{}", left, right))
            } else {
                arithmetic(op, left, right)?
            }
        }
        Operator::Sub | Operator::Mul | Operator::Div => arithmetic(op, left, right)?,
        Operator::Mod => modulo(left, right)?,
        Operator::Concat => Value::Str(format!("{}{}", left, right)),
        Operator::Gt => Value::Bool(compare(left, right) == Some(Ordering::Greater)),
        Operator::Lt => Value::Bool(compare(left, right) == Some(Ordering::Less)),
        Operator::Ge => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        Operator::Le => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        Operator::Eq => Value::Bool(loose_eq(left, right)),
        Operator::Ne => Value::Bool(!loose_eq(left, right)),
        Operator::And => Value::Bool(left.is_truthy() && right.is_truthy()),
        Operator::Or => Value::Bool(left.is_truthy() || right.is_truthy()),
    };

    Ok(value)
}

fn arithmetic(op: Operator, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let a = to_number(left, op)?;
    let b = to_number(right, op)?;

    if op == Operator::Div && b.is_zero() {
        return Err(RuntimeError::DivisionByZero { pos: None });
    }

    let result = match (a, b) {
        (Num::Int(x), Num::Int(y)) => {
            let exact = match op {
                Operator::Add => x.checked_add(y),
                Operator::Sub => x.checked_sub(y),
                Operator::Mul => x.checked_mul(y),
                _ => x
                    .checked_rem(y)
                    .filter(|r| *r == 0)
                    .and_then(|_| x.checked_div(y)),
            };
            match exact {
                Some(n) => Num::Int(n),
                None => float_op(op, x as f64, y as f64),
            }
        }
        _ => float_op(op, a.as_f64(), b.as_f64()),
    };

    Ok(result.into_value())
}

fn float_op(op: Operator, x: f64, y: f64) -> Num {
    Num::Float(match op {
        Operator::Add => x + y,
        Operator::Sub => x - y,
        Operator::Mul => x * y,
        _ => x / y,
    })
}

fn modulo(left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let a = to_int(to_number(left, Operator::Mod)?);
    let b = to_int(to_number(right, Operator::Mod)?);

    if b == 0 {
        return Err(RuntimeError::DivisionByZero { pos: None });
    }

    Ok(Value::Int(a.checked_rem(b).unwrap_or(0)))
}

fn to_int(n: Num) -> i64 {
    match n {
        Num::Int(n) => n,
        Num::Float(n) => n as i64,
    }
}

fn to_number(value: &Value, op: Operator) -> Result<Num, RuntimeError> {
    match value {
        Value::Int(n) => Ok(Num::Int(*n)),
        Value::Float(n) => Ok(Num::Float(*n)),
        Value::Bool(b) => Ok(Num::Int(*b as i64)),
        Value::Null => Ok(Num::Int(0)),
        Value::Str(s) => parse_numeric(s).ok_or_else(|| {
            RuntimeError::type_mismatch(format!(
                "unsupported operand for '{}': non-numeric string \"{}\"",
                op, s
            ))
        }),
        other => Err(RuntimeError::type_mismatch(format!(
            "unsupported operand for '{}': {}",
            op,
            other.type_name()
        ))),
    }
}

/// Numeric strings: optional surrounding whitespace, integer or decimal.
fn parse_numeric(s: &str) -> Option<Num> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Some(Num::Int(n));
    }
    // Rust accepts "inf" and "nan"; numeric strings never do.
    if trimmed
        .chars()
        .any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E')
    {
        return None;
    }
    trimmed.parse::<f64>().ok().map(Num::Float)
}

// =============================================================================
// Comparison
// =============================================================================

/// Loose equality.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loose_eq(x, y))
        }
        (Value::Record(a), Value::Record(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, x)| b.get(k).is_some_and(|y| loose_eq(x, y)))
        }
        (Value::Object(a), Value::Object(b)) => a == b,
        _ => compare(left, right) == Some(Ordering::Equal),
    }
}

/// Loose ordering. `None` when the operands cannot be ordered.
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    use Value::*;

    match (left, right) {
        (Null, Null) => Some(Ordering::Equal),
        (Null, Str(s)) => "".partial_cmp(s.as_str()),
        (Str(s), Null) => s.as_str().partial_cmp(""),
        (Bool(_) | Null, _) | (_, Bool(_) | Null) => {
            left.is_truthy().partial_cmp(&right.is_truthy())
        }

        (Int(a), Int(b)) => a.partial_cmp(b),
        (Int(_) | Float(_), Int(_) | Float(_)) => {
            let a = to_number(left, Operator::Eq).ok()?;
            let b = to_number(right, Operator::Eq).ok()?;
            a.as_f64().partial_cmp(&b.as_f64())
        }

        (Int(_) | Float(_), Str(s)) => match parse_numeric(s) {
            Some(b) => number_cmp(to_number(left, Operator::Eq).ok()?, b),
            None => left.to_string().as_str().partial_cmp(s.as_str()),
        },
        (Str(s), Int(_) | Float(_)) => match parse_numeric(s) {
            Some(a) => number_cmp(a, to_number(right, Operator::Eq).ok()?),
            None => s.as_str().partial_cmp(right.to_string().as_str()),
        },

        (Str(a), Str(b)) => match (parse_numeric(a), parse_numeric(b)) {
            (Some(x), Some(y)) => number_cmp(x, y),
            _ => a.partial_cmp(b),
        },

        (List(a), List(b)) => {
            if a.len() != b.len() {
                return a.len().partial_cmp(&b.len());
            }
            for (x, y) in a.iter().zip(b) {
                match compare(x, y)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(Ordering::Equal)
        }
        (List(_), _) => Some(Ordering::Greater),
        (_, List(_)) => Some(Ordering::Less),

        _ => None,
    }
}

fn number_cmp(a: Num, b: Num) -> Option<Ordering> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => x.partial_cmp(&y),
        _ => a.as_f64().partial_cmp(&b.as_f64()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(op: Operator, left: impl Into<Value>, right: impl Into<Value>) -> Value {
        apply(op, &left.into(), &right.into()).unwrap()
    }

    // =========================================================================
    // Arithmetic
    // =========================================================================

    #[test]
    fn test_add_integers() {
        assert_eq!(run(Operator::Add, 1, 2), Value::Int(3));
    }

    #[test]
    fn test_add_mixed_int_float() {
        assert_eq!(run(Operator::Add, 1, 0.5), Value::Float(1.5));
    }

    #[test]
    fn test_add_concatenates_strings() {
        assert_eq!(run(Operator::Add, "a", 1), Value::from("a1"));
        assert_eq!(run(Operator::Add, 2, "b"), Value::from("2b"));
        assert_eq!(run(Operator::Add, "1", "2"), Value::from("12"));
    }

    #[test]
    fn test_add_overflow_becomes_float() {
        assert_eq!(
            run(Operator::Add, i64::MAX, 1),
            Value::Float(i64::MAX as f64 + 1.0)
        );
    }

    #[test]
    fn test_numeric_string_arithmetic() {
        assert_eq!(run(Operator::Mul, "3", 2), Value::Int(6));
        assert_eq!(run(Operator::Sub, " 2.5 ", 1), Value::Float(1.5));
    }

    #[test]
    fn test_non_numeric_string_arithmetic_fails() {
        let err = apply(Operator::Sub, &Value::from("abc"), &Value::Int(1)).unwrap_err();
        assert!(matches!(err, RuntimeError::TypeMismatch { .. }));

        let err = apply(Operator::Sub, &Value::from("nan"), &Value::Int(1)).unwrap_err();
        assert!(matches!(err, RuntimeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_div_exact_stays_integer() {
        assert_eq!(run(Operator::Div, 6, 3), Value::Int(2));
        assert_eq!(run(Operator::Div, 7, 2), Value::Float(3.5));
    }

    #[test]
    fn test_div_by_zero() {
        let err = apply(Operator::Div, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert!(matches!(err, RuntimeError::DivisionByZero { .. }));

        let err = apply(Operator::Div, &Value::Int(1), &Value::Float(0.0)).unwrap_err();
        assert!(matches!(err, RuntimeError::DivisionByZero { .. }));
    }

    #[test]
    fn test_mod() {
        assert_eq!(run(Operator::Mod, 7, 3), Value::Int(1));
        assert_eq!(run(Operator::Mod, 7.9, 3), Value::Int(1));
        let err = apply(Operator::Mod, &Value::Int(7), &Value::Int(0)).unwrap_err();
        assert!(matches!(err, RuntimeError::DivisionByZero { .. }));
    }

    #[test]
    fn test_concat_operator() {
        assert_eq!(run(Operator::Concat, 1, 2), Value::from("12"));
        assert_eq!(run(Operator::Concat, "a", Value::Null), Value::from("a"));
        assert_eq!(run(Operator::Concat, true, 1.5), Value::from("11.5"));
    }

    #[test]
    fn test_arithmetic_on_list_fails() {
        let err = apply(Operator::Mul, &Value::List(vec![]), &Value::Int(1)).unwrap_err();
        assert!(matches!(err, RuntimeError::TypeMismatch { .. }));
    }

    // =========================================================================
    // Comparison and logic
    // =========================================================================

    #[test]
    fn test_numeric_comparison() {
        assert_eq!(run(Operator::Lt, 1, 2), Value::Bool(true));
        assert_eq!(run(Operator::Le, 2, 2.0), Value::Bool(true));
        assert_eq!(run(Operator::Gt, 1, 2), Value::Bool(false));
        assert_eq!(run(Operator::Ge, 3, "2"), Value::Bool(true));
    }

    #[test]
    fn test_loose_equality() {
        assert_eq!(run(Operator::Eq, 1, "1"), Value::Bool(true));
        assert_eq!(run(Operator::Eq, "1.0", "1"), Value::Bool(true));
        assert_eq!(run(Operator::Eq, 0, "a"), Value::Bool(false));
        assert_eq!(run(Operator::Eq, Value::Null, false), Value::Bool(true));
        assert_eq!(run(Operator::Eq, Value::Null, ""), Value::Bool(true));
        assert_eq!(run(Operator::Eq, "abc", "abc"), Value::Bool(true));
        assert_eq!(run(Operator::Ne, "abc", "abd"), Value::Bool(true));
    }

    #[test]
    fn test_list_equality() {
        let a = Value::List(vec![Value::Int(1), Value::from("2")]);
        let b = Value::List(vec![Value::from("1"), Value::Int(2)]);
        assert!(loose_eq(&a, &b));
        assert!(!loose_eq(&a, &Value::List(vec![])));
    }

    #[test]
    fn test_string_ordering() {
        assert_eq!(run(Operator::Lt, "apple", "banana"), Value::Bool(true));
        assert_eq!(run(Operator::Lt, "10", "9"), Value::Bool(false));
    }

    #[test]
    fn test_nan_never_compares() {
        assert_eq!(run(Operator::Eq, f64::NAN, f64::NAN), Value::Bool(false));
        assert_eq!(run(Operator::Lt, f64::NAN, 1), Value::Bool(false));
    }

    #[test]
    fn test_and_or_use_truthiness() {
        assert_eq!(run(Operator::And, 1, "x"), Value::Bool(true));
        assert_eq!(run(Operator::And, 1, "0"), Value::Bool(false));
        assert_eq!(run(Operator::Or, 0, Value::Null), Value::Bool(false));
        assert_eq!(run(Operator::Or, 0, 0.1), Value::Bool(true));
    }
}
