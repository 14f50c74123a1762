//! # Sift Query
//!
//! Compiles a [`DynamicQuery`](sift_core::DynamicQuery) into native queries
//! for three kinds of backend and runs them through a repository facade.
//!
//! ## Pipeline
//!
//! 1. [`Lowering`] splits criteria into AND-groups, resolves nested paths and
//!    produces a backend-neutral [`QueryPlan`].
//! 2. A [`QueryCompiler`] renders the plan:
//!    - [`SqlCompiler`]: parameterized SQL with `EXISTS` sub-queries per relation
//!    - [`SearchCompiler`]: search-index query DSL with `nested` wrappers
//!    - [`DocumentCompiler`]: document-store filter, also evaluable in memory
//! 3. [`DynamicRepository`] executes the native query through a
//!    [`QueryExecutor`](sift_core::QueryExecutor) and materializes the rows.
//!
//! ## Example
//!
//! ```rust
//! use sift_core::DynamicQuery;
//! use sift_query::{QueryCompiler, SearchCompiler};
//!
//! let query = DynamicQuery::builder()
//!     .greater_than("age", 30)
//!     .equal("department.name", "Math")
//!     .build();
//! let compiled = SearchCompiler::default().compile(&query, "employees").unwrap();
//!
//! assert_eq!(compiled.native.body["size"], 20);
//! ```

pub mod compare;
pub mod compile;
pub mod error;
pub mod ir;
pub mod lower;
pub mod memory;
pub mod repository;

pub use compile::{
    CompiledQuery, CompilerContext, DocumentCompiler, DocumentFilter, DocumentQuery,
    DocumentSort, QueryCompiler, SearchCompiler, SearchRequest, SqlCompiler, SqlQuery,
};
pub use error::{CompileError, CompileResult, DataAccessError, DataAccessResult};
pub use ir::{CompareOp, PageRequest, Predicate, QueryPlan, SortKey, TextMode};
pub use lower::Lowering;
pub use memory::{MemoryCollection, MemoryStore, MemoryTransaction};
pub use repository::{DynamicRepository, Page};
