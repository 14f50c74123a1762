//! Lowering of a [`DynamicQuery`] into a [`QueryPlan`].
//!
//! - Criteria are split into AND-groups at OR markers; one group is a plain
//!   AND, several are an OR with at least one group required.
//! - A criterion with a blank key, no operator or no values contributes
//!   nothing. So does a parentheses criterion whose first value is not a
//!   criteria list. A nested list holding an unknown operator fails the
//!   whole compile.
//! - Predicates on nested paths are wrapped in [`Predicate::Within`] from the
//!   innermost boundary outwards.
//! - `SPECIFIED` with the left-join marker tests the immediate parent
//!   relation instead of the leaf.
//! - `SPECIFIED false` negates outside any nesting, so it is the exact
//!   complement of `SPECIFIED true`.

use crate::error::{CompileError, CompileResult};
use crate::ir::{CompareOp, PageRequest, Predicate, QueryPlan, SortKey, TextMode};
use serde_json::Value;
use sift_config::QueryConfig;
use sift_core::group::split;
use sift_core::{CriteriaOperator, Criterion, DynamicQuery, NestedPathResolver};
use tracing::{debug, warn};

/// Turns queries into plans using one resolver and pagination config
#[derive(Debug, Clone, Copy)]
pub struct Lowering<'a> {
    resolver: &'a NestedPathResolver,
    config: &'a QueryConfig,
}

impl<'a> Lowering<'a> {
    pub fn new(resolver: &'a NestedPathResolver, config: &'a QueryConfig) -> Self {
        Self { resolver, config }
    }

    /// Lower a full query
    pub fn lower(&self, query: &DynamicQuery) -> CompileResult<QueryPlan> {
        let filter = self.lower_criteria(&query.where_)?;
        let plan = QueryPlan {
            filter,
            sort: self.sort(query),
            page: self.page(query)?,
            select: query.select.clone(),
            distinct: query.distinct,
        };
        debug!(
            criteria = query.where_.len(),
            sorts = plan.sort.len(),
            page = plan.page.number,
            size = plan.page.size,
            "Lowered query"
        );
        Ok(plan)
    }

    /// Lower a criteria list as one logical unit
    pub fn lower_criteria(&self, criteria: &[Criterion]) -> CompileResult<Predicate> {
        let groups = split(criteria);
        let mut compiled = Vec::with_capacity(groups.len());

        for group in &groups {
            let mut parts = Vec::with_capacity(group.len());
            for criterion in group {
                if let Some(predicate) = self.lower_criterion(criterion)? {
                    parts.push(predicate);
                }
            }
            compiled.push(Predicate::and(parts));
        }

        Ok(match compiled.len() {
            0 => Predicate::MatchAll,
            _ => Predicate::any_of(compiled),
        })
    }

    fn lower_criterion(&self, criterion: &Criterion) -> CompileResult<Option<Predicate>> {
        let Some(operator) = criterion.operator else {
            debug!(key = %criterion.key, "Dropping criterion without operator");
            return Ok(None);
        };

        match operator {
            CriteriaOperator::Parentheses => {
                return match criterion.nested_criteria()? {
                    Some(nested) if !nested.is_empty() => self.lower_criteria(&nested).map(Some),
                    _ => {
                        debug!("Dropping parentheses criterion without a nested list");
                        Ok(None)
                    }
                };
            }
            CriteriaOperator::Or => {
                return Err(CompileError::UnsupportedOperator(operator.to_string()));
            }
            _ => {}
        }

        if criterion.has_blank_key() {
            debug!(operator = %operator, "Dropping criterion with blank key");
            return Ok(None);
        }
        if criterion.values.is_empty() {
            debug!(key = %criterion.key, "Dropping criterion without values");
            return Ok(None);
        }

        let key = self.resolver.parse_key(&criterion.key);
        let nested = self.resolver.resolve(&key.path);

        if operator == CriteriaOperator::Specified {
            let present = match (key.left_join, key.parent(), &nested) {
                (true, Some(parent), Some(info)) => {
                    let outer = &info.nested_segments[..info.nested_segments.len() - 1];
                    Predicate::RelationPresent(parent.to_string()).wrap_nested(outer)
                }
                (_, _, Some(info)) => {
                    Predicate::Present(key.path.clone()).wrap_nested(&info.nested_segments)
                }
                (_, _, None) => Predicate::Present(key.path.clone()),
            };
            return Ok(Some(if criterion.specified_flag() {
                present
            } else {
                Predicate::not(present)
            }));
        }

        let leaf = leaf_predicate(&key.path, operator, &criterion.values)?;
        Ok(Some(match nested {
            Some(info) => leaf.wrap_nested(&info.nested_segments),
            None => leaf,
        }))
    }

    fn sort(&self, query: &DynamicQuery) -> Vec<SortKey> {
        query
            .order_by
            .iter()
            .filter(|spec| !spec.field.trim().is_empty())
            .map(|spec| {
                let field = self.resolver.parse_key(&spec.field).path;
                SortKey {
                    nested: self.resolver.resolve(&field),
                    field,
                    direction: spec.direction,
                }
            })
            .collect()
    }

    fn page(&self, query: &DynamicQuery) -> CompileResult<PageRequest> {
        let number = query
            .page_number
            .unwrap_or(self.config.default_page_number);
        let mut size = query.page_size.unwrap_or(self.config.default_page_size);

        if size == 0 {
            return Err(CompileError::InvalidPagination(
                "page size must be greater than 0".to_string(),
            ));
        }
        if let Some(max) = self.config.max_page_size {
            if size > max {
                warn!(requested = size, max, "Clamping page size");
                size = max;
            }
        }

        Ok(PageRequest { number, size })
    }
}

fn leaf_predicate(
    field: &str,
    operator: CriteriaOperator,
    values: &[Value],
) -> CompileResult<Predicate> {
    let first = || values[0].clone();
    let text = |mode| Predicate::Text {
        field: field.to_string(),
        mode,
        needle: text_of(&values[0]),
    };
    let compare = |op, value| Predicate::Compare {
        field: field.to_string(),
        op,
        value,
    };
    let present = || Predicate::Present(field.to_string());

    let predicate = match operator {
        CriteriaOperator::Equal => Predicate::any_of(
            values
                .iter()
                .map(|v| compare(CompareOp::Eq, v.clone()))
                .collect(),
        ),
        CriteriaOperator::NotEqual => Predicate::And(vec![
            present(),
            Predicate::not(Predicate::any_of(
                values
                    .iter()
                    .map(|v| compare(CompareOp::Eq, v.clone()))
                    .collect(),
            )),
        ]),
        CriteriaOperator::Contain => text(TextMode::Contains),
        CriteriaOperator::DoesNotContain => {
            Predicate::And(vec![present(), Predicate::not(text(TextMode::Contains))])
        }
        CriteriaOperator::StartWith => text(TextMode::StartsWith),
        CriteriaOperator::EndWith => text(TextMode::EndsWith),
        CriteriaOperator::GreaterThan => compare(CompareOp::Gt, first()),
        CriteriaOperator::GreaterThanOrEqual => compare(CompareOp::Gte, first()),
        CriteriaOperator::LessThan => compare(CompareOp::Lt, first()),
        CriteriaOperator::LessThanOrEqual => compare(CompareOp::Lte, first()),
        CriteriaOperator::Specified => present(),
        CriteriaOperator::Parentheses | CriteriaOperator::Or => {
            return Err(CompileError::UnsupportedOperator(operator.to_string()))
        }
    };
    Ok(predicate)
}

/// Text form of a criterion value
pub(crate) fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
