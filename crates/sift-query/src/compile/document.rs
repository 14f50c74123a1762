//! Document-store compiler.
//!
//! Produces a [`DocumentQuery`] whose filter renders to a MongoDB-style
//! filter document and can also be evaluated in memory.
//!
//! Each nesting scope becomes an `$elemMatch` on the path relative to the
//! enclosing scope, so every condition inside one scope must hold on the same
//! element. In memory a single sub-document counts as a one-element scope;
//! MongoDB's `$elemMatch` only matches arrays, so to-one sub-documents belong
//! in `paths.embedded` when targeting it.

use super::{CompilerContext, QueryCompiler};
use crate::compare::{loose_eq, strict_order_cmp};
use crate::error::CompileResult;
use crate::ir::{CompareOp, Predicate, QueryPlan, TextMode};
use serde::Serialize;
use serde_json::{json, Map, Value};
use sift_config::SiftConfig;
use sift_core::path::relative_to;
use sift_core::Order;
use std::cmp::Ordering;

// ============================================================================
// Filter
// ============================================================================

/// Filter over documents
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DocumentFilter {
    All,
    And(Vec<DocumentFilter>),
    Or(Vec<DocumentFilter>),
    /// None of the children match
    Nor(Vec<DocumentFilter>),
    Cmp {
        field: String,
        op: CompareOp,
        value: Value,
    },
    Text {
        field: String,
        mode: TextMode,
        needle: String,
    },
    /// Some non-null value exists at the path
    Exists { field: String },
    /// The path holds something other than null or an empty array
    NonEmpty { field: String },
    /// Some element at `path` satisfies `filter`; inner fields are relative
    ElemMatch {
        path: String,
        filter: Box<DocumentFilter>,
    },
}

impl DocumentFilter {
    pub fn from_predicate(predicate: &Predicate) -> Self {
        Self::scoped(predicate, "")
    }

    /// Convert with field paths made relative to the enclosing `scope`
    fn scoped(predicate: &Predicate, scope: &str) -> Self {
        let field_of = |field: &str| relative_to(field, scope).to_string();
        match predicate {
            Predicate::MatchAll => Self::All,
            Predicate::And(children) => {
                let mut flat = Vec::with_capacity(children.len());
                for child in children {
                    match Self::scoped(child, scope) {
                        Self::And(inner) => flat.extend(inner),
                        Self::All => {}
                        other => flat.push(other),
                    }
                }
                match flat.len() {
                    0 => Self::All,
                    1 => flat.remove(0),
                    _ => Self::And(flat),
                }
            }
            Predicate::AnyOf(children) => Self::Or(
                children
                    .iter()
                    .map(|child| Self::scoped(child, scope))
                    .collect(),
            ),
            Predicate::Not(inner) => Self::Nor(vec![Self::scoped(inner, scope)]),
            Predicate::Compare { field, op, value } => Self::Cmp {
                field: field_of(field.as_str()),
                op: *op,
                value: value.clone(),
            },
            Predicate::Text {
                field,
                mode,
                needle,
            } => Self::Text {
                field: field_of(field.as_str()),
                mode: *mode,
                needle: needle.clone(),
            },
            Predicate::Present(field) => Self::Exists {
                field: field_of(field.as_str()),
            },
            Predicate::Within { path, predicate } => Self::ElemMatch {
                path: field_of(path.as_str()),
                filter: Box::new(Self::scoped(predicate, path)),
            },
            Predicate::RelationPresent(field) => Self::NonEmpty {
                field: field_of(field.as_str()),
            },
        }
    }

    /// Render as a MongoDB filter document
    pub fn to_mongo(&self) -> Value {
        match self {
            Self::All => json!({}),
            Self::And(children) => json!({"$and": Self::render_all(children)}),
            Self::Or(children) => json!({"$or": Self::render_all(children)}),
            Self::Nor(children) => json!({"$nor": Self::render_all(children)}),
            Self::Cmp { field, op, value } => {
                let operator = match op {
                    CompareOp::Eq => "$eq",
                    CompareOp::Gt => "$gt",
                    CompareOp::Gte => "$gte",
                    CompareOp::Lt => "$lt",
                    CompareOp::Lte => "$lte",
                };
                json!({field.as_str(): {operator: value}})
            }
            Self::Text {
                field,
                mode,
                needle,
            } => {
                let escaped = regex::escape(needle);
                let pattern = match mode {
                    TextMode::Contains => escaped,
                    TextMode::StartsWith => format!("^{}", escaped),
                    TextMode::EndsWith => format!("{}$", escaped),
                };
                json!({field.as_str(): {"$regex": pattern, "$options": "i"}})
            }
            Self::Exists { field } => json!({field.as_str(): {"$exists": true, "$ne": null}}),
            Self::NonEmpty { field } => {
                json!({field.as_str(): {"$exists": true, "$nin": [null, []]}})
            }
            Self::ElemMatch { path, filter } => {
                json!({path.as_str(): {"$elemMatch": filter.to_mongo()}})
            }
        }
    }

    fn render_all(children: &[DocumentFilter]) -> Vec<Value> {
        children.iter().map(Self::to_mongo).collect()
    }

    /// Evaluate against one document.
    ///
    /// A path matches when any value reachable through it matches, with
    /// arrays traversed implicitly at every step. An `ElemMatch` evaluates its
    /// filter against each element at its path in turn.
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Self::All => true,
            Self::And(children) => children.iter().all(|c| c.matches(document)),
            Self::Or(children) => children.iter().any(|c| c.matches(document)),
            Self::Nor(children) => !children.iter().any(|c| c.matches(document)),
            Self::Cmp { field, op, value } => values_at(document, field)
                .into_iter()
                .any(|candidate| compare(candidate, *op, value)),
            Self::Text {
                field,
                mode,
                needle,
            } => {
                let needle = needle.to_lowercase();
                values_at(document, field).into_iter().any(|candidate| {
                    let Some(text) = candidate.as_str() else {
                        return false;
                    };
                    let text = text.to_lowercase();
                    match mode {
                        TextMode::Contains => text.contains(&needle),
                        TextMode::StartsWith => text.starts_with(&needle),
                        TextMode::EndsWith => text.ends_with(&needle),
                    }
                })
            }
            Self::Exists { field } | Self::NonEmpty { field } => values_at(document, field)
                .into_iter()
                .any(|candidate| !candidate.is_null()),
            Self::ElemMatch { path, filter } => values_at(document, path)
                .into_iter()
                .any(|element| filter.matches(element)),
        }
    }
}

fn compare(candidate: &Value, op: CompareOp, target: &Value) -> bool {
    if op == CompareOp::Eq {
        return loose_eq(candidate, target);
    }
    match strict_order_cmp(candidate, target) {
        Some(Ordering::Greater) => matches!(op, CompareOp::Gt | CompareOp::Gte),
        Some(Ordering::Less) => matches!(op, CompareOp::Lt | CompareOp::Lte),
        Some(Ordering::Equal) => matches!(op, CompareOp::Gte | CompareOp::Lte),
        None => false,
    }
}

/// Every value reachable through a dotted path, arrays flattened
pub(crate) fn values_at<'a>(document: &'a Value, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    collect(document, &segments, &mut out);
    out
}

fn collect<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    match (segments.split_first(), value) {
        (None, Value::Array(items)) => out.extend(items.iter()),
        (None, other) => out.push(other),
        (Some(_), Value::Array(items)) => {
            for item in items {
                collect(item, segments, out);
            }
        }
        (Some((head, rest)), Value::Object(map)) => {
            if let Some(child) = map.get(*head) {
                collect(child, rest, out);
            }
        }
        (Some(_), _) => {}
    }
}

// ============================================================================
// Query
// ============================================================================

/// One sort key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSort {
    pub field: String,
    pub direction: Order,
}

/// Find request against one collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentQuery {
    pub collection: String,
    pub filter: DocumentFilter,
    pub sort: Vec<DocumentSort>,
    pub skip: u64,
    pub limit: u32,
    /// Source paths to keep; empty keeps whole documents
    pub projection: Vec<String>,
    pub distinct: bool,
}

impl DocumentQuery {
    /// Render as a `find` command document
    pub fn to_mongo(&self) -> Value {
        let mut command = Map::new();
        command.insert("find".to_string(), json!(self.collection));
        command.insert("filter".to_string(), self.filter.to_mongo());

        if !self.sort.is_empty() {
            // Array of single-key documents keeps the key order explicit
            let sort: Vec<Value> = self
                .sort
                .iter()
                .map(|key| {
                    let direction = match key.direction {
                        Order::Asc => 1,
                        Order::Desc => -1,
                    };
                    json!({key.field.as_str(): direction})
                })
                .collect();
            command.insert("sort".to_string(), Value::Array(sort));
        }
        if !self.projection.is_empty() {
            let projection: Map<String, Value> = self
                .projection
                .iter()
                .map(|path| (path.clone(), json!(1)))
                .collect();
            command.insert("projection".to_string(), Value::Object(projection));
        }

        command.insert("skip".to_string(), json!(self.skip));
        command.insert("limit".to_string(), json!(self.limit));
        Value::Object(command)
    }
}

// ============================================================================
// Compiler
// ============================================================================

/// Compiler for document stores
#[derive(Debug, Clone, Default)]
pub struct DocumentCompiler {
    context: CompilerContext,
}

impl DocumentCompiler {
    pub fn new(config: &SiftConfig) -> Self {
        Self {
            context: CompilerContext::new(config),
        }
    }

    pub fn with_context(context: CompilerContext) -> Self {
        Self { context }
    }
}

impl QueryCompiler for DocumentCompiler {
    type Native = DocumentQuery;

    fn name(&self) -> &str {
        "document"
    }

    fn context(&self) -> &CompilerContext {
        &self.context
    }

    fn render(&self, plan: &QueryPlan, target: &str) -> CompileResult<DocumentQuery> {
        Ok(DocumentQuery {
            collection: target.to_string(),
            filter: DocumentFilter::from_predicate(&plan.filter),
            sort: plan
                .sort
                .iter()
                .map(|key| DocumentSort {
                    field: key.field.clone(),
                    direction: key.direction,
                })
                .collect(),
            skip: plan.page.offset(),
            limit: plan.page.size,
            projection: plan.select.iter().map(|pair| pair.source.clone()).collect(),
            distinct: plan.distinct,
        })
    }
}
