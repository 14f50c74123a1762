//! DynamicQuery and its fluent builder.
//!
//! A [`DynamicQuery`] is the full request shape handed to a compiler:
//! filters, sort order, projection, pagination and the distinct flag. It is
//! built per request and consumed once.

use crate::criteria::{CriteriaOperator, Criterion};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            other => Err(format!("unknown sort direction: {}", other)),
        }
    }
}

/// One sort clause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub direction: Order,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, direction: Order) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// Source path to target path pair of a projection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectPath {
    /// Dotted path in the stored data
    pub source: String,
    /// Dotted path in the result shape
    pub target: String,
}

impl SelectPath {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Pair whose source and target are the same path
    pub fn same(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            source: path.clone(),
            target: path,
        }
    }
}

/// Backend-neutral query request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DynamicQuery {
    /// Filter criteria, in order
    #[serde(rename = "where")]
    pub where_: Vec<Criterion>,
    /// Sort clauses, first-listed wins for ties
    pub order_by: Vec<SortSpec>,
    /// Projection; empty means pass-through
    pub select: Vec<SelectPath>,
    pub page_number: Option<u32>,
    pub page_size: Option<u32>,
    pub distinct: bool,
}

impl DynamicQuery {
    /// Create an empty query that matches everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fluent builder
    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    /// Append one criterion
    pub fn add_where(&mut self, criterion: Criterion) -> &mut Self {
        self.where_.push(criterion);
        self
    }

    /// Append several criteria, keeping their order
    pub fn add_where_all(&mut self, criteria: impl IntoIterator<Item = Criterion>) -> &mut Self {
        self.where_.extend(criteria);
        self
    }

    /// Append a sort clause
    pub fn add_sort(&mut self, field: impl Into<String>, direction: Order) -> &mut Self {
        self.order_by.push(SortSpec::new(field, direction));
        self
    }

    /// Append a projection pair
    pub fn add_select(&mut self, source: impl Into<String>, target: impl Into<String>) -> &mut Self {
        self.select.push(SelectPath::new(source, target));
        self
    }

    /// Set page number and size
    pub fn set_page(&mut self, number: u32, size: u32) -> &mut Self {
        self.page_number = Some(number);
        self.page_size = Some(size);
        self
    }

    pub fn set_distinct(&mut self, distinct: bool) -> &mut Self {
        self.distinct = distinct;
        self
    }

    /// Check if the query carries a projection
    pub fn has_select(&self) -> bool {
        !self.select.is_empty()
    }
}

/// Fluent construction of a [`DynamicQuery`]
///
/// ```
/// use sift_core::{DynamicQuery, Order};
///
/// let query = DynamicQuery::builder()
///     .greater_than("age", 30)
///     .equal("department.name", "Math")
///     .sort("age", Order::Desc)
///     .page(0, 20)
///     .build();
///
/// assert_eq!(query.where_.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: DynamicQuery,
}

impl QueryBuilder {
    /// Append an arbitrary criterion
    pub fn criterion(mut self, criterion: Criterion) -> Self {
        self.query.where_.push(criterion);
        self
    }

    /// Append a criterion built from parts
    pub fn filter(
        self,
        key: impl Into<String>,
        operator: CriteriaOperator,
        values: Vec<Value>,
    ) -> Self {
        self.criterion(Criterion::new(key, operator, values))
    }

    pub fn equal(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criterion(Criterion::of(key, CriteriaOperator::Equal, value))
    }

    /// Match any one of several values
    pub fn equal_any<V: Into<Value>>(
        self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.filter(key, CriteriaOperator::Equal, values)
    }

    pub fn not_equal(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criterion(Criterion::of(key, CriteriaOperator::NotEqual, value))
    }

    pub fn contain(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criterion(Criterion::of(key, CriteriaOperator::Contain, value))
    }

    pub fn does_not_contain(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criterion(Criterion::of(key, CriteriaOperator::DoesNotContain, value))
    }

    pub fn start_with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criterion(Criterion::of(key, CriteriaOperator::StartWith, value))
    }

    pub fn end_with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criterion(Criterion::of(key, CriteriaOperator::EndWith, value))
    }

    pub fn greater_than(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criterion(Criterion::of(key, CriteriaOperator::GreaterThan, value))
    }

    pub fn greater_than_or_equal(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criterion(Criterion::of(
            key,
            CriteriaOperator::GreaterThanOrEqual,
            value,
        ))
    }

    pub fn less_than(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criterion(Criterion::of(key, CriteriaOperator::LessThan, value))
    }

    pub fn less_than_or_equal(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criterion(Criterion::of(key, CriteriaOperator::LessThanOrEqual, value))
    }

    /// Existence check; `false` tests for absence
    pub fn specified(self, key: impl Into<String>, present: bool) -> Self {
        self.criterion(Criterion::of(key, CriteriaOperator::Specified, present))
    }

    /// Close the current AND-group
    pub fn or(self) -> Self {
        self.criterion(Criterion::or())
    }

    /// Append a parenthesized sub-expression built by `build`
    pub fn group(self, build: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        let nested = build(QueryBuilder::default()).query.where_;
        self.criterion(Criterion::parentheses(nested))
    }

    pub fn sort(mut self, field: impl Into<String>, direction: Order) -> Self {
        self.query.add_sort(field, direction);
        self
    }

    pub fn select(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.query.add_select(source, target);
        self
    }

    pub fn page(mut self, number: u32, size: u32) -> Self {
        self.query.set_page(number, size);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.query.distinct = true;
        self
    }

    pub fn build(self) -> DynamicQuery {
        self.query
    }
}
