//! Per-backend query compilers.
//!
//! Every compiler shares the same front half: a [`DynamicQuery`] is lowered
//! into a [`QueryPlan`] by [`Lowering`]. Backends only implement
//! [`QueryCompiler::render`], turning the plan into their native query.

mod document;
mod search;
mod sql;

pub use document::{DocumentCompiler, DocumentFilter, DocumentQuery, DocumentSort};
pub(crate) use document::values_at;
pub use search::{SearchCompiler, SearchRequest};
pub use sql::{SqlCompiler, SqlQuery};

use crate::error::CompileResult;
use crate::ir::QueryPlan;
use crate::lower::Lowering;
use sift_config::{QueryConfig, SiftConfig};
use sift_core::{DynamicQuery, NestedPathResolver};
use std::sync::Arc;
use tracing::debug;

/// State shared by every compiler
#[derive(Debug, Clone)]
pub struct CompilerContext {
    pub resolver: Arc<NestedPathResolver>,
    pub query: QueryConfig,
}

impl CompilerContext {
    pub fn new(config: &SiftConfig) -> Self {
        Self {
            resolver: Arc::new(NestedPathResolver::new(&config.paths)),
            query: config.query.clone(),
        }
    }

    /// Share a resolver (and its cache) with other compilers
    pub fn with_resolver(resolver: Arc<NestedPathResolver>, query: QueryConfig) -> Self {
        Self { resolver, query }
    }

    pub fn lowering(&self) -> Lowering<'_> {
        Lowering::new(&self.resolver, &self.query)
    }
}

impl Default for CompilerContext {
    fn default() -> Self {
        Self::new(&SiftConfig::default())
    }
}

/// Native query together with the plan it was rendered from
#[derive(Debug, Clone)]
pub struct CompiledQuery<N> {
    pub native: N,
    pub plan: QueryPlan,
}

/// Compiles a [`DynamicQuery`] for one backend
pub trait QueryCompiler: Send + Sync {
    /// Backend-native query type
    type Native: Send + Sync;

    /// Unique name for this backend
    fn name(&self) -> &str;

    fn context(&self) -> &CompilerContext;

    /// Render a lowered plan against the `target` table, index or collection
    fn render(&self, plan: &QueryPlan, target: &str) -> CompileResult<Self::Native>;

    /// Lower and render a query
    fn compile(
        &self,
        query: &DynamicQuery,
        target: &str,
    ) -> CompileResult<CompiledQuery<Self::Native>> {
        let plan = self.context().lowering().lower(query)?;
        let native = self.render(&plan, target)?;
        debug!(backend = self.name(), target, "Compiled query");
        Ok(CompiledQuery { native, plan })
    }
}
