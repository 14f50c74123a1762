use super::{Constructor, FieldDef, FieldKind, FieldRole, Model};
use crate::error::{ModelError, ModelResult};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::any::TypeId;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

static DESCRIPTORS: Lazy<DashMap<TypeId, Arc<ModelDescriptor>>> = Lazy::new(DashMap::new);

/// Descriptor of `M`, built on first use and cached per type.
///
/// Concurrent first calls may each build a descriptor; they are equivalent
/// and the last insert wins.
pub fn descriptor_of<M: Model>() -> ModelResult<Arc<ModelDescriptor>> {
    let key = TypeId::of::<M>();
    if let Some(found) = DESCRIPTORS.get(&key) {
        return Ok(Arc::clone(found.value()));
    }

    let built = Arc::new(ModelDescriptor::build(
        M::model_name(),
        M::constructor(),
        M::fields(),
    )?);
    debug!(
        model = built.name,
        fields = built.fields.len(),
        "Cached model descriptor"
    );
    DESCRIPTORS.insert(key, Arc::clone(&built));
    Ok(built)
}

/// A validated field
#[derive(Debug, Clone)]
pub enum DescribedField {
    Leaf {
        name: String,
        source: String,
        kind: FieldKind,
    },
    SubModel {
        name: String,
        /// Resolved source prefix, empty for none
        prefix: String,
        descriptor: Arc<ModelDescriptor>,
    },
    Object {
        name: String,
        source: String,
    },
    Ignored {
        name: String,
    },
}

impl DescribedField {
    pub fn name(&self) -> &str {
        match self {
            Self::Leaf { name, .. }
            | Self::SubModel { name, .. }
            | Self::Object { name, .. }
            | Self::Ignored { name } => name,
        }
    }
}

/// A scalar reachable from the model root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafPath {
    /// Full dotted source path, sub-model prefixes included
    pub source: String,
    /// Full dotted target path
    pub target: String,
    pub kind: FieldKind,
}

/// Immutable description of one model type
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub name: &'static str,
    pub constructor: Constructor,
    pub fields: Vec<DescribedField>,
}

impl ModelDescriptor {
    /// Validate declared fields and resolve sub-model descriptors
    pub fn build(
        name: &'static str,
        constructor: Constructor,
        defs: Vec<FieldDef>,
    ) -> ModelResult<Self> {
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(defs.len());

        for def in defs {
            if !seen.insert(def.name.clone()) {
                return Err(ModelError::DuplicateField {
                    model: name.to_string(),
                    field: def.name,
                });
            }

            let field = match def.role {
                FieldRole::Leaf { source, kind } => DescribedField::Leaf {
                    source: source.unwrap_or_else(|| def.name.clone()),
                    name: def.name,
                    kind,
                },
                FieldRole::SubModel { prefix, model } => DescribedField::SubModel {
                    prefix: prefix.unwrap_or_else(|| def.name.clone()),
                    name: def.name,
                    descriptor: (model.descriptor)()?,
                },
                FieldRole::Object { .. } if constructor.is_record() => {
                    return Err(ModelError::NestedTypeOnRecord {
                        model: name.to_string(),
                        field: def.name,
                    });
                }
                FieldRole::Object { source } => DescribedField::Object {
                    source: source.unwrap_or_else(|| def.name.clone()),
                    name: def.name,
                },
                FieldRole::Ignored if constructor.is_record() => {
                    return Err(ModelError::IgnoredFieldOnRecord {
                        model: name.to_string(),
                        field: def.name,
                    });
                }
                FieldRole::Ignored => DescribedField::Ignored { name: def.name },
            };
            fields.push(field);
        }

        Ok(Self {
            name,
            constructor,
            fields,
        })
    }

    pub fn is_record(&self) -> bool {
        self.constructor.is_record()
    }

    /// Every mapped scalar, depth-first in declaration order
    pub fn leaves(&self) -> Vec<LeafPath> {
        let mut out = Vec::new();
        self.collect_leaves("", "", &mut out);
        out
    }

    fn collect_leaves(&self, source_prefix: &str, target_prefix: &str, out: &mut Vec<LeafPath>) {
        for field in &self.fields {
            match field {
                DescribedField::Leaf { name, source, kind } => out.push(LeafPath {
                    source: join(source_prefix, source),
                    target: join(target_prefix, name),
                    kind: *kind,
                }),
                DescribedField::Object { name, source } => out.push(LeafPath {
                    source: join(source_prefix, source),
                    target: join(target_prefix, name),
                    kind: FieldKind::Any,
                }),
                DescribedField::SubModel {
                    name,
                    prefix,
                    descriptor,
                } => descriptor.collect_leaves(
                    &join(source_prefix, prefix),
                    &join(target_prefix, name),
                    out,
                ),
                DescribedField::Ignored { .. } => {}
            }
        }
    }
}

/// Join two dotted path parts, skipping empty ones
pub(crate) fn join(prefix: &str, rest: &str) -> String {
    match (prefix.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{}.{}", prefix, rest),
    }
}
