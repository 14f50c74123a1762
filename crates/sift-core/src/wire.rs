//! Query-parameter decoding
//!
//! Requests arriving as flat key/value parameters use indexed names:
//!
//! | Parameter | Meaning |
//! |---|---|
//! | `key{i}` | field key of criterion `i` (may be omitted for `OR`) |
//! | `operation{i}` | operator name of criterion `i` |
//! | `values{i}` | comma separated values of criterion `i` |
//! | `orderBy{i}` / `orderByDirection{i}` | sort clause `i` (`ASC` default) |
//! | `select{i}` / `selectAs{i}` | projection pair `i` (target defaults to source) |
//! | `pageNumber`, `pageSize`, `distinct` | pagination and distinct flag |
//!
//! Indices need not be contiguous; entries are taken in ascending index
//! order. Parenthesized groups cannot be expressed here and are only
//! available through the JSON shape of [`DynamicQuery`].

use crate::criteria::{CriteriaOperator, Criterion};
use crate::error::{CriteriaError, CriteriaResult};
use crate::query::{DynamicQuery, Order, SelectPath, SortSpec};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

const KEY: &str = "key";
const OPERATION: &str = "operation";
const VALUES: &str = "values";
const ORDER_BY: &str = "orderBy";
const ORDER_BY_DIRECTION: &str = "orderByDirection";
const SELECT: &str = "select";
const SELECT_AS: &str = "selectAs";
const PAGE_NUMBER: &str = "pageNumber";
const PAGE_SIZE: &str = "pageSize";
const DISTINCT: &str = "distinct";

/// Decode a full query from request parameters
pub fn decode_query<I, K, V>(params: I) -> CriteriaResult<DynamicQuery>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let params = collect(params);

    let query = DynamicQuery {
        where_: criteria_from(&params)?,
        order_by: sort_from(&params)?,
        select: select_from(&params),
        page_number: optional_number(&params, PAGE_NUMBER)?,
        page_size: optional_number(&params, PAGE_SIZE)?,
        distinct: optional_flag(&params, DISTINCT)?,
    };

    debug!(
        criteria = query.where_.len(),
        sorts = query.order_by.len(),
        selects = query.select.len(),
        "Decoded query parameters"
    );
    Ok(query)
}

/// Decode only the criteria list from request parameters
pub fn decode_criteria<I, K, V>(params: I) -> CriteriaResult<Vec<Criterion>>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    criteria_from(&collect(params))
}

/// Read a raw value as a JSON scalar.
///
/// Numbers, booleans and `null` become their JSON form; anything else stays
/// a string.
pub fn parse_scalar(raw: &str) -> Value {
    let trimmed = raw.trim();
    match trimmed {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        if float.is_finite() && trimmed.chars().any(|c| c.is_ascii_digit()) {
            return Value::from(float);
        }
    }
    Value::String(raw.to_string())
}

/// Split a comma separated parameter into scalar values
pub fn parse_values(raw: &str) -> Vec<Value> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(',').map(parse_scalar).collect()
}

// ============================================================================
// Helpers
// ============================================================================

fn collect<I, K, V>(params: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    params
        .into_iter()
        .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
        .collect()
}

/// Indices `i` for which a parameter `{prefix}{i}` exists
fn indices(params: &HashMap<String, String>, prefixes: &[&str]) -> BTreeSet<usize> {
    params
        .keys()
        .filter_map(|name| {
            prefixes.iter().find_map(|prefix| {
                name.strip_prefix(prefix)
                    .and_then(|rest| rest.parse::<usize>().ok())
            })
        })
        .collect()
}

fn criteria_from(params: &HashMap<String, String>) -> CriteriaResult<Vec<Criterion>> {
    let mut criteria = Vec::new();

    for i in indices(params, &[KEY, OPERATION, VALUES]) {
        let name = format!("{}{}", OPERATION, i);
        let operator: CriteriaOperator = params
            .get(&name)
            .ok_or_else(|| CriteriaError::MalformedParameter {
                name: name.clone(),
                message: "operation is required".to_string(),
            })?
            .parse()?;

        let key = params
            .get(&format!("{}{}", KEY, i))
            .cloned()
            .unwrap_or_default();
        let values = params
            .get(&format!("{}{}", VALUES, i))
            .map(|raw| parse_values(raw))
            .unwrap_or_default();

        criteria.push(Criterion::new(key, operator, values));
    }

    Ok(criteria)
}

fn sort_from(params: &HashMap<String, String>) -> CriteriaResult<Vec<SortSpec>> {
    let mut sorts = Vec::new();

    for i in indices(params, &[ORDER_BY]) {
        let Some(field) = params.get(&format!("{}{}", ORDER_BY, i)) else {
            continue;
        };
        let name = format!("{}{}", ORDER_BY_DIRECTION, i);
        let direction = match params.get(&name) {
            Some(raw) => raw
                .parse::<Order>()
                .map_err(|message| CriteriaError::MalformedParameter { name, message })?,
            None => Order::Asc,
        };
        sorts.push(SortSpec::new(field.clone(), direction));
    }

    Ok(sorts)
}

fn select_from(params: &HashMap<String, String>) -> Vec<SelectPath> {
    indices(params, &[SELECT])
        .into_iter()
        .filter_map(|i| {
            let source = params.get(&format!("{}{}", SELECT, i))?;
            let target = params
                .get(&format!("{}{}", SELECT_AS, i))
                .unwrap_or(source);
            Some(SelectPath::new(source.clone(), target.clone()))
        })
        .collect()
}

fn optional_number(params: &HashMap<String, String>, name: &str) -> CriteriaResult<Option<u32>> {
    params
        .get(name)
        .map(|raw| {
            raw.trim()
                .parse::<u32>()
                .map_err(|e| CriteriaError::MalformedParameter {
                    name: name.to_string(),
                    message: e.to_string(),
                })
        })
        .transpose()
}

fn optional_flag(params: &HashMap<String, String>, name: &str) -> CriteriaResult<bool> {
    match params.get(name).map(|raw| raw.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(raw) if raw == "true" => Ok(true),
        Some(raw) if raw == "false" || raw.is_empty() => Ok(false),
        Some(raw) => Err(CriteriaError::MalformedParameter {
            name: name.to_string(),
            message: format!("expected true or false, got {}", raw),
        }),
    }
}
