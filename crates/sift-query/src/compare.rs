//! JSON value ordering used when evaluating document filters in memory.

use serde_json::Value;
use std::cmp::Ordering;

/// Strict comparator for values of the same kind.
///
/// Numbers compare as `f64` regardless of their integer or float encoding.
/// Returns `None` for mismatched or non-orderable kinds, which makes every
/// range comparison against them false.
#[must_use]
pub fn strict_order_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => a.partial_cmp(b),
        _ => None,
    }
}

/// Equality with numeric normalization
#[must_use]
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match strict_order_cmp(left, right) {
        Some(ordering) => ordering == Ordering::Equal,
        None => left == right,
    }
}

/// Total comparator used for sorting.
///
/// Orders by kind rank first (null, bool, number, string, array, object),
/// then within the kind. Missing values sort as null.
#[must_use]
pub fn canonical_cmp(left: &Value, right: &Value) -> Ordering {
    let rank = canonical_rank(left).cmp(&canonical_rank(right));
    if rank != Ordering::Equal {
        return rank;
    }

    match (left, right) {
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| canonical_cmp(x, y))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (Value::Object(_), Value::Object(_)) => left.to_string().cmp(&right.to_string()),
        _ => strict_order_cmp(left, right).unwrap_or(Ordering::Equal),
    }
}

const fn canonical_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
