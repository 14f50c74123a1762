//! # Sift Core
//!
//! Backend-neutral pieces of the dynamic query system:
//!
//! - [`criteria`]: criteria and the operator vocabulary
//! - [`query`]: [`DynamicQuery`] and its fluent builder
//! - [`group`]: splitting criteria into AND-groups at OR markers
//! - [`path`]: nested path resolution and the left-join marker
//! - [`wire`]: decoding criteria from indexed request parameters
//! - [`model`]: model descriptors, their cache and the registry
//! - [`projection`]: select derivation and materialization
//! - [`update`]: the multi-level update cascade
//! - [`storage`]: the collaborator traits for execution and transactions
//!
//! Query compilation for concrete backends lives in `sift-query`.

pub mod coerce;
pub mod criteria;
pub mod error;
pub mod group;
pub mod model;
pub mod path;
pub mod projection;
pub mod query;
pub mod storage;
pub mod update;
pub mod wire;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use criteria::{CriteriaOperator, Criterion, LogicalRole};
pub use error::{
    CriteriaError, CriteriaResult, ModelError, ModelResult, UpdateError, UpdateResult,
};
pub use model::{
    descriptor_of, Constructor, FieldDef, FieldKind, FloatWidth, IntWidth, Model,
    ModelDescriptor, ModelRegistry,
};
pub use path::{FieldKey, NestedPathInfo, NestedPathResolver};
pub use projection::{derive_select, materialize, materialize_all, materialize_row};
pub use query::{DynamicQuery, Order, QueryBuilder, SelectPath, SortSpec};
pub use storage::{
    QueryExecutor, RawPage, StorageError, StorageResult, TransactionManager, UnitOfWork,
};
pub use update::{LevelWrite, UpdateEngine, UpdateReport};

/// Re-exported so dependents share one configuration type
pub use sift_config::SiftConfig;
