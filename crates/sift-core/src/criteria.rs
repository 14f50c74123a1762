//! Criteria Model
//!
//! A [`Criterion`] is one filter condition: a field key, an operator and an
//! ordered list of opaque values. Keys use dotted notation for nested or
//! joined fields. The left-join marker (`<` by default) may replace the last
//! `.` of a key to traverse a relation that may be absent; it only changes
//! the meaning of [`CriteriaOperator::Specified`], which then tests the
//! relation itself instead of the leaf.
//!
//! Two operators carry no field:
//! - [`CriteriaOperator::Or`] separates AND-groups.
//! - [`CriteriaOperator::Parentheses`] wraps a nested criteria list, stored as
//!   the first value, so the list is compiled as one logical unit.

use crate::error::{CriteriaError, CriteriaResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Closed set of criteria operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CriteriaOperator {
    Equal,
    NotEqual,
    Contain,
    DoesNotContain,
    StartWith,
    EndWith,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    /// Existence check; takes a single boolean value
    Specified,
    /// Wraps a nested criteria list
    Parentheses,
    /// Pure separator between AND-groups
    Or,
}

impl CriteriaOperator {
    /// Wire name of the operator
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "EQUAL",
            Self::NotEqual => "NOT_EQUAL",
            Self::Contain => "CONTAIN",
            Self::DoesNotContain => "DOES_NOT_CONTAIN",
            Self::StartWith => "START_WITH",
            Self::EndWith => "END_WITH",
            Self::GreaterThan => "GREATER_THAN",
            Self::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
            Self::LessThan => "LESS_THAN",
            Self::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
            Self::Specified => "SPECIFIED",
            Self::Parentheses => "PARENTHESES",
            Self::Or => "OR",
        }
    }

    /// Check if this operator matches text patterns
    pub fn is_text_match(&self) -> bool {
        matches!(
            self,
            Self::Contain | Self::DoesNotContain | Self::StartWith | Self::EndWith
        )
    }

    /// Check if this operator is an ordering comparison
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            Self::GreaterThan | Self::GreaterThanOrEqual | Self::LessThan | Self::LessThanOrEqual
        )
    }

    /// Logical role the operator plays when grouping
    pub fn logical_role(&self) -> LogicalRole {
        match self {
            Self::Or => LogicalRole::Or,
            Self::Parentheses => LogicalRole::Parentheses,
            _ => LogicalRole::And,
        }
    }
}

impl fmt::Display for CriteriaOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CriteriaOperator {
    type Err = CriteriaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.trim().to_ascii_uppercase().as_str() {
            "EQUAL" => Self::Equal,
            "NOT_EQUAL" => Self::NotEqual,
            "CONTAIN" => Self::Contain,
            "DOES_NOT_CONTAIN" => Self::DoesNotContain,
            "START_WITH" => Self::StartWith,
            "END_WITH" => Self::EndWith,
            "GREATER_THAN" => Self::GreaterThan,
            "GREATER_THAN_OR_EQUAL" => Self::GreaterThanOrEqual,
            "LESS_THAN" => Self::LessThan,
            "LESS_THAN_OR_EQUAL" => Self::LessThanOrEqual,
            "SPECIFIED" => Self::Specified,
            "PARENTHESES" | "PARENTHES" => Self::Parentheses,
            "OR" => Self::Or,
            _ => return Err(CriteriaError::UnsupportedOperator(s.to_string())),
        };
        Ok(op)
    }
}

impl TryFrom<String> for CriteriaOperator {
    type Error = CriteriaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CriteriaOperator> for String {
    fn from(op: CriteriaOperator) -> Self {
        op.as_str().to_string()
    }
}

/// How a criterion takes part in grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalRole {
    And,
    Or,
    Parentheses,
}

/// One filter condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    /// Field path, possibly dotted or using the left-join marker
    #[serde(default)]
    pub key: String,

    /// Operator; `None` means the criterion contributes nothing
    #[serde(rename = "operation", default)]
    pub operator: Option<CriteriaOperator>,

    /// Operator arguments
    #[serde(default)]
    pub values: Vec<Value>,
}

impl Criterion {
    /// Create a criterion with several values
    pub fn new(key: impl Into<String>, operator: CriteriaOperator, values: Vec<Value>) -> Self {
        Self {
            key: key.into(),
            operator: Some(operator),
            values,
        }
    }

    /// Create a single-valued criterion
    pub fn of(key: impl Into<String>, operator: CriteriaOperator, value: impl Into<Value>) -> Self {
        Self::new(key, operator, vec![value.into()])
    }

    /// Create an OR separator
    pub fn or() -> Self {
        Self {
            key: String::new(),
            operator: Some(CriteriaOperator::Or),
            values: Vec::new(),
        }
    }

    /// Wrap a criteria list so it is compiled as one unit
    pub fn parentheses(criteria: Vec<Criterion>) -> Self {
        let nested = criteria.into_iter().map(Criterion::into_value).collect();
        Self {
            key: String::new(),
            operator: Some(CriteriaOperator::Parentheses),
            values: vec![Value::Array(nested)],
        }
    }

    /// Logical role, `And` when the operator is unset
    pub fn logical_role(&self) -> LogicalRole {
        self.operator
            .map(|op| op.logical_role())
            .unwrap_or(LogicalRole::And)
    }

    /// Check if this criterion is an OR separator
    pub fn is_or_marker(&self) -> bool {
        self.operator == Some(CriteriaOperator::Or)
    }

    /// Check if the key is empty or whitespace
    pub fn has_blank_key(&self) -> bool {
        self.key.trim().is_empty()
    }

    /// Nested list of a parentheses criterion.
    ///
    /// Returns `Ok(None)` when the first value is not a criteria list. An
    /// element with an unknown operator fails with
    /// [`CriteriaError::UnsupportedOperator`]; any other element that is not a
    /// criterion fails with [`CriteriaError::MalformedParameter`].
    pub fn nested_criteria(&self) -> CriteriaResult<Option<Vec<Criterion>>> {
        let Some(Value::Array(items)) = self.values.first() else {
            return Ok(None);
        };

        let mut nested = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            if let Some(Value::String(name)) = item.get("operation") {
                name.parse::<CriteriaOperator>()?;
            }
            let criterion = serde_json::from_value(item.clone()).map_err(|e| {
                CriteriaError::MalformedParameter {
                    name: format!("values[0][{}]", index),
                    message: e.to_string(),
                }
            })?;
            nested.push(criterion);
        }
        Ok(Some(nested))
    }

    /// Boolean argument of a SPECIFIED criterion.
    ///
    /// Accepts JSON booleans and the strings `"true"`/`"false"` in any case;
    /// anything else reads as `false`.
    pub fn specified_flag(&self) -> bool {
        match self.values.first() {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    fn into_value(self) -> Value {
        let mut object = Map::new();
        object.insert("key".to_string(), Value::String(self.key));
        object.insert(
            "operation".to_string(),
            self.operator
                .map(|op| Value::String(op.as_str().to_string()))
                .unwrap_or(Value::Null),
        );
        object.insert("values".to_string(), Value::Array(self.values));
        Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_round_trips_wire_name() {
        for op in [
            CriteriaOperator::Equal,
            CriteriaOperator::DoesNotContain,
            CriteriaOperator::GreaterThanOrEqual,
            CriteriaOperator::Parentheses,
        ] {
            assert_eq!(op.as_str().parse::<CriteriaOperator>().unwrap(), op);
        }
    }

    #[test]
    fn test_operator_accepts_legacy_parentheses_spelling() {
        assert_eq!(
            "PARENTHES".parse::<CriteriaOperator>().unwrap(),
            CriteriaOperator::Parentheses
        );
        assert_eq!(
            "start_with".parse::<CriteriaOperator>().unwrap(),
            CriteriaOperator::StartWith
        );
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let err = "BETWEEN".parse::<CriteriaOperator>().unwrap_err();
        assert!(matches!(err, CriteriaError::UnsupportedOperator(ref op) if op == "BETWEEN"));
    }

    #[test]
    fn test_criterion_json_shape() {
        let criterion = Criterion::of("age", CriteriaOperator::GreaterThan, 30);
        let value = serde_json::to_value(&criterion).unwrap();

        assert_eq!(
            value,
            json!({"key": "age", "operation": "GREATER_THAN", "values": [30]})
        );
    }

    #[test]
    fn test_unknown_operator_fails_deserialization() {
        let result: Result<Criterion, _> =
            serde_json::from_value(json!({"key": "age", "operation": "LIKE", "values": [1]}));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_operator_deserializes_as_none() {
        let criterion: Criterion = serde_json::from_value(json!({"key": "age"})).unwrap();
        assert_eq!(criterion.operator, None);
        assert!(criterion.values.is_empty());
    }

    #[test]
    fn test_parentheses_nested_criteria() {
        let inner = vec![
            Criterion::of("name", CriteriaOperator::Equal, "Ann"),
            Criterion::or(),
            Criterion::of("name", CriteriaOperator::Equal, "Bob"),
        ];
        let criterion = Criterion::parentheses(inner.clone());

        assert_eq!(criterion.logical_role(), LogicalRole::Parentheses);
        assert_eq!(criterion.nested_criteria(), Ok(Some(inner)));
    }

    #[test]
    fn test_nested_criteria_requires_list() {
        let criterion = Criterion::of("", CriteriaOperator::Parentheses, "oops");
        assert_eq!(criterion.nested_criteria(), Ok(None));
    }

    #[test]
    fn test_nested_unknown_operator_is_rejected() {
        let criterion: Criterion = serde_json::from_value(json!({
            "operation": "PARENTHESES",
            "values": [[{"key": "x", "operation": "BETWEEN", "values": [1]}]]
        }))
        .unwrap();

        assert_eq!(
            criterion.nested_criteria(),
            Err(CriteriaError::UnsupportedOperator("BETWEEN".to_string()))
        );
    }

    #[test]
    fn test_nested_element_that_is_not_a_criterion() {
        let criterion = Criterion::new(
            "",
            CriteriaOperator::Parentheses,
            vec![json!([{"key": "x", "values": 5}])],
        );

        assert!(matches!(
            criterion.nested_criteria(),
            Err(CriteriaError::MalformedParameter { .. })
        ));
    }

    #[test]
    fn test_specified_flag() {
        assert!(Criterion::of("a", CriteriaOperator::Specified, true).specified_flag());
        assert!(Criterion::of("a", CriteriaOperator::Specified, "TRUE").specified_flag());
        assert!(!Criterion::of("a", CriteriaOperator::Specified, "no").specified_flag());
        assert!(!Criterion::new("a", CriteriaOperator::Specified, vec![]).specified_flag());
    }
}
