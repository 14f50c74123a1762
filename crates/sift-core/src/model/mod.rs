//! Model Descriptors
//!
//! A model is a result or update shape whose fields map to source paths in
//! stored data. Types opt in by implementing [`Model`], which supplies the
//! path table explicitly instead of reflecting over annotations:
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use sift_core::model::{Constructor, FieldDef, Model};
//!
//! #[derive(Debug, Deserialize, Serialize)]
//! struct DepartmentView {
//!     id: i64,
//!     title: String,
//! }
//!
//! impl Model for DepartmentView {
//!     fn model_name() -> &'static str {
//!         "DepartmentView"
//!     }
//!
//!     fn constructor() -> Constructor {
//!         Constructor::Record
//!     }
//!
//!     fn fields() -> Vec<FieldDef> {
//!         vec![FieldDef::leaf("id"), FieldDef::leaf("title").source("name")]
//!     }
//! }
//!
//! let descriptor = DepartmentView::descriptor().unwrap();
//! assert_eq!(descriptor.fields.len(), 2);
//! ```
//!
//! Descriptors are built once per type and cached process-wide; see
//! [`descriptor_of`].

mod descriptor;
mod registry;

pub use descriptor::{descriptor_of, DescribedField, LeafPath, ModelDescriptor};
pub(crate) use descriptor::join;
pub use registry::ModelRegistry;

use crate::error::ModelResult;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// A type with a model descriptor
pub trait Model: 'static {
    /// Name used in errors and in the [`ModelRegistry`]
    fn model_name() -> &'static str;

    /// How instances are built
    fn constructor() -> Constructor;

    /// Declared fields, in declaration order
    fn fields() -> Vec<FieldDef>;

    /// Cached descriptor of this type
    fn descriptor() -> ModelResult<Arc<ModelDescriptor>>
    where
        Self: Sized,
    {
        descriptor_of::<Self>()
    }
}

/// Construction strategy, chosen once per type
#[derive(Debug, Clone, Copy)]
pub enum Constructor {
    /// Immutable shape built from every component at once
    Record,
    /// Mutable shape: start from a blank instance and assign present fields
    Class {
        /// Serialized default instance
        blank: fn() -> Value,
    },
}

impl Constructor {
    /// Class strategy using `T::default()` as the blank instance
    pub fn class<T: Default + Serialize>() -> Self {
        Self::Class { blank: blank_of::<T> }
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record)
    }
}

fn blank_of<T: Default + Serialize>() -> Value {
    serde_json::to_value(T::default()).unwrap_or(Value::Null)
}

/// Declared target type of a leaf, driving value coercion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldKind {
    /// No coercion
    #[default]
    Any,
    Bool,
    /// String; scalars are stringified
    Text,
    /// Integer of the given width; wider values are narrowed with wrapping,
    /// values outside `i64` are left unchanged
    Int(IntWidth),
    Float(FloatWidth),
    /// Epoch milliseconds
    Timestamp,
    /// RFC 3339 date-time string
    Instant,
    /// Enum carried by name; ordinals index into the variant list
    Enum(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatWidth {
    F32,
    F64,
}

/// Reference to a sub-model's descriptor
#[derive(Clone, Copy)]
pub struct SubModelRef {
    pub name: &'static str,
    pub descriptor: fn() -> ModelResult<Arc<ModelDescriptor>>,
}

impl std::fmt::Debug for SubModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubModelRef").field("name", &self.name).finish()
    }
}

/// What a declared field is
#[derive(Debug, Clone)]
pub enum FieldRole {
    /// Scalar mapped from one source path
    Leaf {
        source: Option<String>,
        kind: FieldKind,
    },
    /// Nested model; `prefix` of `None` means the field name, `Some("")` none
    SubModel {
        prefix: Option<String>,
        model: SubModelRef,
    },
    /// Object-valued field that is not a sub-model; only classes accept it
    Object { source: Option<String> },
    /// Excluded from mapping; only classes accept it
    Ignored,
}

/// One declared field of a model
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub role: FieldRole,
}

impl FieldDef {
    /// Leaf whose source path defaults to its name
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: FieldRole::Leaf {
                source: None,
                kind: FieldKind::Any,
            },
        }
    }

    /// Sub-model whose relation prefix defaults to its name
    pub fn sub_model<M: Model>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: FieldRole::SubModel {
                prefix: None,
                model: SubModelRef {
                    name: M::model_name(),
                    descriptor: descriptor_of::<M>,
                },
            },
        }
    }

    /// Object-valued field copied as a whole
    pub fn object(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: FieldRole::Object { source: None },
        }
    }

    pub fn ignored(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: FieldRole::Ignored,
        }
    }

    /// Set an explicit source path on a leaf or object field
    pub fn source(mut self, path: impl Into<String>) -> Self {
        match &mut self.role {
            FieldRole::Leaf { source, .. } | FieldRole::Object { source } => {
                *source = Some(path.into())
            }
            FieldRole::SubModel { .. } | FieldRole::Ignored => {}
        }
        self
    }

    /// Set the declared kind of a leaf
    pub fn kind(mut self, field_kind: FieldKind) -> Self {
        if let FieldRole::Leaf { kind, .. } = &mut self.role {
            *kind = field_kind;
        }
        self
    }

    /// Set the relation prefix of a sub-model; `""` adds no prefix
    pub fn prefix(mut self, value: impl Into<String>) -> Self {
        if let FieldRole::SubModel { prefix, .. } = &mut self.role {
            *prefix = Some(value.into());
        }
        self
    }
}
