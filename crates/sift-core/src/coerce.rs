//! Value coercion toward a declared [`FieldKind`].
//!
//! The conversion table is small and fixed. Values it cannot convert are
//! returned unchanged so deserialization of the target type decides.

use crate::model::{FieldKind, FloatWidth, IntWidth};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};

/// Coerce `value` toward `kind`
pub fn coerce(value: Value, kind: FieldKind) -> Value {
    if value.is_null() {
        return value;
    }
    match kind {
        FieldKind::Any => value,
        FieldKind::Bool => to_bool(value),
        FieldKind::Text => to_text(value),
        FieldKind::Int(width) => to_int(value, width),
        FieldKind::Float(width) => to_float(value, width),
        FieldKind::Timestamp => to_timestamp(value),
        FieldKind::Instant => to_instant(value),
        FieldKind::Enum(variants) => to_enum(value, variants),
    }
}

fn to_bool(value: Value) -> Value {
    match &value {
        Value::String(s) if s.eq_ignore_ascii_case("true") => Value::Bool(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Value::Bool(false),
        _ => value,
    }
}

fn to_text(value: Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        other => other,
    }
}

/// Integer value, `None` outside the `i64` range
fn integer_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) if n.is_f64() => n
            .as_f64()
            .filter(|f| f.is_finite() && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
            .map(|f| f as i64),
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn narrow(int: i64, width: IntWidth) -> i64 {
    match width {
        IntWidth::W8 => int as i8 as i64,
        IntWidth::W16 => int as i16 as i64,
        IntWidth::W32 => int as i32 as i64,
        IntWidth::W64 => int,
    }
}

fn to_int(value: Value, width: IntWidth) -> Value {
    match integer_of(&value) {
        Some(int) => Value::from(narrow(int, width)),
        None => value,
    }
}

fn to_float(value: Value, width: FloatWidth) -> Value {
    let float = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let float = match (float, width) {
        (Some(f), FloatWidth::F32) => Some(f as f32 as f64),
        (f, _) => f,
    };
    float
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(value)
}

fn to_timestamp(value: Value) -> Value {
    match &value {
        Value::Number(_) => to_int(value, IntWidth::W64),
        Value::String(s) => match DateTime::parse_from_rfc3339(s.trim()) {
            Ok(parsed) => Value::from(parsed.timestamp_millis()),
            Err(_) => value,
        },
        _ => value,
    }
}

fn to_instant(value: Value) -> Value {
    match integer_of(&value).filter(|_| value.is_number()) {
        Some(millis) => match DateTime::<Utc>::from_timestamp_millis(millis) {
            Some(instant) => Value::String(instant.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => value,
        },
        None => value,
    }
}

fn to_enum(value: Value, variants: &'static [&'static str]) -> Value {
    match &value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|ordinal| variants.get(ordinal as usize))
            .map(|name| Value::String((*name).to_string()))
            .unwrap_or(value),
        Value::String(s) => variants
            .iter()
            .find(|name| name.eq_ignore_ascii_case(s.trim()))
            .map(|name| Value::String((*name).to_string()))
            .unwrap_or(value),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    const STATUS: &[&str] = &["ACTIVE", "PASSIVE"];

    #[test_case(json!(300), FieldKind::Int(IntWidth::W8), json!(44) ; "int narrowing wraps")]
    #[test_case(json!(7.9), FieldKind::Int(IntWidth::W64), json!(7) ; "float to int truncates")]
    #[test_case(json!("12"), FieldKind::Int(IntWidth::W32), json!(12) ; "numeric string to int")]
    #[test_case(json!(3), FieldKind::Float(FloatWidth::F64), json!(3.0) ; "int widens to float")]
    #[test_case(json!(42), FieldKind::Text, json!("42") ; "number stringified")]
    #[test_case(json!(true), FieldKind::Text, json!("true") ; "bool stringified")]
    #[test_case(json!("TRUE"), FieldKind::Bool, json!(true) ; "string to bool")]
    #[test_case(json!(1), FieldKind::Enum(STATUS), json!("PASSIVE") ; "ordinal to enum name")]
    #[test_case(json!("active"), FieldKind::Enum(STATUS), json!("ACTIVE") ; "enum name canonicalized")]
    #[test_case(json!(9), FieldKind::Enum(STATUS), json!(9) ; "out of range ordinal passes through")]
    #[test_case(json!("2024-01-02T03:04:05Z"), FieldKind::Timestamp, json!(1704164645000i64) ; "instant to timestamp")]
    #[test_case(json!(1704164645000i64), FieldKind::Instant, json!("2024-01-02T03:04:05.000Z") ; "timestamp to instant")]
    #[test_case(json!("abc"), FieldKind::Int(IntWidth::W32), json!("abc") ; "unconvertible passes through")]
    #[test_case(json!(u64::MAX), FieldKind::Int(IntWidth::W64), json!(u64::MAX) ; "u64 beyond i64 passes through")]
    #[test_case(json!(1e20), FieldKind::Int(IntWidth::W64), json!(1e20) ; "huge float passes through")]
    #[test_case(json!({"a": 1}), FieldKind::Text, json!({"a": 1}) ; "object passes through")]
    fn test_coerce(input: Value, kind: FieldKind, expected: Value) {
        assert_eq!(coerce(input, kind), expected);
    }

    #[test]
    fn test_null_is_preserved() {
        assert_eq!(coerce(Value::Null, FieldKind::Int(IntWidth::W32)), Value::Null);
    }
}
