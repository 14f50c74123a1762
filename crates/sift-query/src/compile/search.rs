//! Search-index compiler producing an Elasticsearch-style query DSL body.
//!
//! | Predicate | DSL |
//! |---|---|
//! | equality | `match_phrase` |
//! | range | `range` with `gt`/`gte`/`lt`/`lte` |
//! | contains / ends with | case-insensitive `wildcard`, `\ * ?` escaped |
//! | starts with | case-insensitive `prefix` |
//! | present | `exists` |
//! | nesting | `nested` with `score_mode: none` |
//! | and / or / not | `bool` `must` / `should` + `minimum_should_match: 1` / `must_not` |

use super::{CompilerContext, QueryCompiler};
use crate::error::CompileResult;
use crate::ir::{CompareOp, Predicate, QueryPlan, SortKey, TextMode};
use serde::Serialize;
use serde_json::{json, Map, Value};
use sift_config::SiftConfig;
use sift_core::Order;

/// Search request against one index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub index: String,
    pub body: Value,
}

impl SearchRequest {
    /// The `query` clause of the body
    pub fn query(&self) -> &Value {
        &self.body["query"]
    }
}

/// Compiler for search indexes
#[derive(Debug, Clone, Default)]
pub struct SearchCompiler {
    context: CompilerContext,
}

impl SearchCompiler {
    pub fn new(config: &SiftConfig) -> Self {
        Self {
            context: CompilerContext::new(config),
        }
    }

    pub fn with_context(context: CompilerContext) -> Self {
        Self { context }
    }
}

impl QueryCompiler for SearchCompiler {
    type Native = SearchRequest;

    fn name(&self) -> &str {
        "search"
    }

    fn context(&self) -> &CompilerContext {
        &self.context
    }

    fn render(&self, plan: &QueryPlan, target: &str) -> CompileResult<SearchRequest> {
        let mut body = Map::new();
        body.insert("query".to_string(), render_predicate(&plan.filter));
        body.insert("from".to_string(), json!(plan.page.offset()));
        body.insert("size".to_string(), json!(plan.page.size));
        body.insert("track_total_hits".to_string(), json!(true));

        if !plan.sort.is_empty() {
            let sort: Vec<Value> = plan.sort.iter().map(render_sort).collect();
            body.insert("sort".to_string(), Value::Array(sort));
        }
        if !plan.select.is_empty() {
            let includes: Vec<Value> = plan
                .select
                .iter()
                .map(|pair| Value::String(pair.source.clone()))
                .collect();
            body.insert("_source".to_string(), Value::Array(includes));
        }
        // distinct is applied to projected hits, the DSL has no equivalent

        Ok(SearchRequest {
            index: target.to_string(),
            body: Value::Object(body),
        })
    }
}

fn render_predicate(predicate: &Predicate) -> Value {
    match predicate {
        Predicate::MatchAll => json!({"match_all": {}}),
        Predicate::And(children) => {
            let (negated, positive): (Vec<&Predicate>, Vec<&Predicate>) =
                children.iter().partition(|c| matches!(c, Predicate::Not(_)));
            let mut clause = Map::new();
            if !positive.is_empty() {
                clause.insert(
                    "must".to_string(),
                    Value::Array(positive.into_iter().map(render_predicate).collect()),
                );
            }
            if !negated.is_empty() {
                let inner = negated
                    .into_iter()
                    .filter_map(|c| match c {
                        Predicate::Not(inner) => Some(render_predicate(inner)),
                        _ => None,
                    })
                    .collect();
                clause.insert("must_not".to_string(), Value::Array(inner));
            }
            json!({"bool": clause})
        }
        Predicate::AnyOf(children) => json!({
            "bool": {
                "should": children.iter().map(render_predicate).collect::<Vec<_>>(),
                "minimum_should_match": 1
            }
        }),
        Predicate::Not(inner) => json!({"bool": {"must_not": [render_predicate(inner)]}}),
        Predicate::Compare {
            field,
            op: CompareOp::Eq,
            value,
        } => json!({"match_phrase": {field.as_str(): value}}),
        Predicate::Compare { field, op, value } => {
            let bound = match op {
                CompareOp::Gt => "gt",
                CompareOp::Gte => "gte",
                CompareOp::Lt => "lt",
                CompareOp::Lte | CompareOp::Eq => "lte",
            };
            json!({"range": {field.as_str(): {bound: value}}})
        }
        Predicate::Text {
            field,
            mode: TextMode::StartsWith,
            needle,
        } => json!({
            "prefix": {field.as_str(): {"value": needle.to_lowercase(), "case_insensitive": true}}
        }),
        Predicate::Text {
            field,
            mode,
            needle,
        } => {
            let escaped = escape_wildcard(&needle.to_lowercase());
            let pattern = match mode {
                TextMode::EndsWith => format!("*{}", escaped),
                _ => format!("*{}*", escaped),
            };
            json!({"wildcard": {field.as_str(): {"value": pattern, "case_insensitive": true}}})
        }
        Predicate::Present(field) => json!({"exists": {"field": field}}),
        Predicate::Within { path, predicate } => json!({
            "nested": {"path": path, "query": render_predicate(predicate), "score_mode": "none"}
        }),
        Predicate::RelationPresent(path) => json!({
            "nested": {"path": path, "query": {"match_all": {}}, "score_mode": "none"}
        }),
    }
}

fn render_sort(key: &SortKey) -> Value {
    let order = match key.direction {
        Order::Asc => "asc",
        Order::Desc => "desc",
    };
    let mut clause = Map::new();
    clause.insert("order".to_string(), json!(order));

    if let Some(info) = &key.nested {
        let nested = info
            .nested_segments
            .iter()
            .rev()
            .fold(None, |inner: Option<Value>, path| {
                let mut level = Map::new();
                level.insert("path".to_string(), json!(path));
                if let Some(inner) = inner {
                    level.insert("nested".to_string(), inner);
                }
                Some(Value::Object(level))
            });
        if let Some(nested) = nested {
            clause.insert("nested".to_string(), nested);
        }
    }

    json!({key.field.as_str(): clause})
}

/// Escape wildcard metacharacters `\`, `*` and `?`
fn escape_wildcard(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '*' | '?') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
