//! Projection and materialization.
//!
//! [`derive_select`] turns a model descriptor into `(source, target)` pairs.
//! Materialization reads each source path from a raw row into a flat map
//! keyed by target path, then rebuilds the target tree bottom-up:
//!
//! - Records receive every component, `null` when absent; sub-models are
//!   always built.
//! - Classes start from their blank instance and only present values are
//!   assigned.
//!
//! Each leaf is coerced toward its declared [`FieldKind`](crate::model::FieldKind)
//! before the tree is deserialized into the target type. A row that fails to
//! deserialize is dropped from a batch, never failing the batch.

use crate::coerce::coerce;
use crate::error::{ModelError, ModelResult};
use crate::model::{join, Constructor, DescribedField, ModelDescriptor};
use crate::path::PATH_SEPARATOR;
use crate::query::SelectPath;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::{trace, warn};

/// Select pairs covering every mapped scalar of the descriptor
pub fn derive_select(descriptor: &ModelDescriptor) -> Vec<SelectPath> {
    descriptor
        .leaves()
        .into_iter()
        .map(|leaf| SelectPath::new(leaf.source, leaf.target))
        .collect()
}

/// Target paths of the descriptor that `select` does not cover
pub fn missing_targets(descriptor: &ModelDescriptor, select: &[SelectPath]) -> Vec<String> {
    let covered: HashSet<&str> = select.iter().map(|s| s.target.as_str()).collect();
    descriptor
        .leaves()
        .into_iter()
        .filter(|leaf| !covered.contains(leaf.target.as_str()))
        .map(|leaf| leaf.target)
        .collect()
}

/// Read a source path from a raw row.
///
/// A key equal to the whole path wins (flat aliased rows); otherwise the
/// path is walked through nested objects, mapping over arrays.
pub fn lookup(row: &Value, path: &str) -> Value {
    if let Value::Object(map) = row {
        if let Some(value) = map.get(path) {
            return value.clone();
        }
    }
    let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    walk(row, &segments)
}

fn walk(value: &Value, segments: &[&str]) -> Value {
    match segments.split_first() {
        None => value.clone(),
        Some((head, rest)) => match value {
            Value::Object(map) => map.get(*head).map(|v| walk(v, rest)).unwrap_or(Value::Null),
            Value::Array(items) => Value::Array(items.iter().map(|item| walk(item, segments)).collect()),
            _ => Value::Null,
        },
    }
}

/// Build the target tree of `descriptor` from a raw row
pub fn project(descriptor: &ModelDescriptor, row: &Value, select: &[SelectPath]) -> Value {
    let flat: HashMap<&str, Value> = select
        .iter()
        .map(|pair| (pair.target.as_str(), lookup(row, &pair.source)))
        .collect();
    build(descriptor, "", &flat)
}

/// Build a nested object from target paths without a descriptor
pub fn project_untyped(row: &Value, select: &[SelectPath]) -> Value {
    let mut root = Map::new();
    for pair in select {
        insert_path(&mut root, &pair.target, lookup(row, &pair.source));
    }
    Value::Object(root)
}

fn insert_path(root: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once(PATH_SEPARATOR) {
        None => {
            root.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = root
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(map) = child {
                insert_path(map, rest, value);
            }
        }
    }
}

fn build(descriptor: &ModelDescriptor, prefix: &str, flat: &HashMap<&str, Value>) -> Value {
    let mut object = match descriptor.constructor {
        Constructor::Record => Map::new(),
        Constructor::Class { blank } => match blank() {
            Value::Object(map) => map,
            _ => Map::new(),
        },
    };
    let record = descriptor.is_record();

    for field in &descriptor.fields {
        let target = join(prefix, field.name());
        match field {
            DescribedField::Leaf { name, kind, .. } => match flat.get(target.as_str()) {
                Some(raw) => {
                    object.insert(name.clone(), coerce(raw.clone(), *kind));
                }
                None if record => {
                    object.insert(name.clone(), Value::Null);
                }
                None => {}
            },
            DescribedField::Object { name, .. } => {
                if let Some(raw) = flat.get(target.as_str()) {
                    object.insert(name.clone(), raw.clone());
                }
            }
            DescribedField::SubModel {
                name, descriptor, ..
            } => {
                if record || has_prefix(flat, &target) {
                    object.insert(name.clone(), build(descriptor, &target, flat));
                }
            }
            DescribedField::Ignored { .. } => {}
        }
    }

    Value::Object(object)
}

fn has_prefix(flat: &HashMap<&str, Value>, target: &str) -> bool {
    flat.keys().any(|key| {
        key.strip_prefix(target)
            .is_some_and(|rest| rest.starts_with(PATH_SEPARATOR))
    })
}

/// Materialize one row into `T` using a select list
pub fn materialize<T: DeserializeOwned>(
    descriptor: &ModelDescriptor,
    row: &Value,
    select: &[SelectPath],
) -> ModelResult<T> {
    let projected = project(descriptor, row, select);
    serde_json::from_value(projected).map_err(|e| ModelError::serialization(e.to_string()))
}

/// Materialize one row, or `None` if it does not fit `T`.
///
/// Without a select list the raw row is deserialized directly.
pub fn materialize_row<T: DeserializeOwned>(
    descriptor: Option<&ModelDescriptor>,
    row: &Value,
    select: &[SelectPath],
) -> Option<T> {
    let projected = shape_row(descriptor, row, select);
    match serde_json::from_value(projected) {
        Ok(item) => Some(item),
        Err(error) => {
            warn!(
                model = descriptor.map(|d| d.name).unwrap_or("<untyped>"),
                %error,
                "Dropping row that does not fit the result type"
            );
            None
        }
    }
}

/// Materialize a batch, dropping rows that fail and optionally de-duplicating
pub fn materialize_all<T: DeserializeOwned>(
    descriptor: Option<&ModelDescriptor>,
    rows: &[Value],
    select: &[SelectPath],
    distinct: bool,
) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(rows.len());

    for row in rows {
        let projected = shape_row(descriptor, row, select);
        if distinct && !seen.insert(projected.to_string()) {
            trace!("Skipping duplicate projected row");
            continue;
        }
        match serde_json::from_value(projected) {
            Ok(item) => out.push(item),
            Err(error) => warn!(
                model = descriptor.map(|d| d.name).unwrap_or("<untyped>"),
                %error,
                "Dropping row that does not fit the result type"
            ),
        }
    }

    out
}

fn shape_row(descriptor: Option<&ModelDescriptor>, row: &Value, select: &[SelectPath]) -> Value {
    match (descriptor, select.is_empty()) {
        (_, true) => row.clone(),
        (Some(descriptor), false) => project(descriptor, row, select),
        (None, false) => project_untyped(row, select),
    }
}
