//! Repository facade: compile, execute, materialize.
//!
//! [`DynamicRepository`] binds one compiler, one executor and one target
//! (table, index or collection). Reads go through the compiler and executor;
//! typed reads derive their select list from the result model. When the
//! executor is also a [`TransactionManager`], updates run the cascade engine
//! inside one transaction.

use crate::compile::QueryCompiler;
use crate::error::{DataAccessError, DataAccessResult};
use crate::ir::PageRequest;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sift_core::projection::{derive_select, missing_targets};
use sift_core::{
    descriptor_of, materialize_all, DynamicQuery, Model, ModelDescriptor, ModelRegistry,
    QueryExecutor, SelectPath, TransactionManager, UpdateEngine, UpdateReport,
};
use std::sync::Arc;
use tracing::debug;

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    /// Matches across all pages
    pub total: u64,
    pub page_number: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, total: u64, page: PageRequest) -> Self {
        let total_pages = match page.size {
            0 => 0,
            size => total.div_ceil(u64::from(size)),
        };
        Self {
            content,
            total,
            page_number: page.number,
            page_size: page.size,
            total_pages,
        }
    }

    pub fn is_last(&self) -> bool {
        u64::from(self.page_number) + 1 >= self.total_pages
    }
}

/// Dynamic-query repository over one backend
pub struct DynamicRepository<C, E> {
    compiler: C,
    executor: E,
    target: String,
    engine: UpdateEngine,
    registry: Arc<ModelRegistry>,
}

impl<C, E> DynamicRepository<C, E>
where
    C: QueryCompiler,
    E: QueryExecutor<C::Native>,
{
    pub fn new(compiler: C, executor: E, target: impl Into<String>) -> Self {
        Self {
            compiler,
            executor,
            target: target.into(),
            engine: UpdateEngine::default(),
            registry: Arc::new(ModelRegistry::new()),
        }
    }

    pub fn with_update_engine(mut self, engine: UpdateEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Share a model registry for untyped updates
    pub fn with_registry(mut self, registry: Arc<ModelRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Matching rows as JSON, projected to the select list when one is given
    pub async fn find_all(&self, query: &DynamicQuery) -> DataAccessResult<Vec<Value>> {
        Ok(self.fetch_untyped(query).await?.0)
    }

    pub async fn find_page(&self, query: &DynamicQuery) -> DataAccessResult<Page<Value>> {
        let (content, total, page) = self.fetch_untyped(query).await?;
        Ok(Page::new(content, total, page))
    }

    /// Matching rows materialized as `T`.
    ///
    /// Without a select list one is derived from `T`; a caller-supplied list
    /// must cover every leaf of `T`. Rows that do not fit `T` are dropped.
    pub async fn find_all_as<T>(&self, query: &DynamicQuery) -> DataAccessResult<Vec<T>>
    where
        T: Model + DeserializeOwned,
    {
        Ok(self.fetch_typed::<T>(query).await?.0)
    }

    pub async fn find_page_as<T>(&self, query: &DynamicQuery) -> DataAccessResult<Page<T>>
    where
        T: Model + DeserializeOwned,
    {
        let (content, total, page) = self.fetch_typed::<T>(query).await?;
        Ok(Page::new(content, total, page))
    }

    /// Matches ignoring pagination
    pub async fn count(&self, query: &DynamicQuery) -> DataAccessResult<u64> {
        let compiled = self.compiler.compile(query, &self.target)?;
        Ok(self.executor.count(&compiled.native).await?)
    }

    async fn fetch_untyped(
        &self,
        query: &DynamicQuery,
    ) -> DataAccessResult<(Vec<Value>, u64, PageRequest)> {
        let compiled = self.compiler.compile(query, &self.target)?;
        let raw = self.executor.execute(&compiled.native).await?;
        let content = materialize_all::<Value>(None, &raw.rows, &query.select, query.distinct);

        debug!(
            backend = self.compiler.name(),
            target = %self.target,
            rows = content.len(),
            total = raw.total,
            "Fetched rows"
        );
        Ok((content, raw.total, compiled.plan.page))
    }

    async fn fetch_typed<T>(
        &self,
        query: &DynamicQuery,
    ) -> DataAccessResult<(Vec<T>, u64, PageRequest)>
    where
        T: Model + DeserializeOwned,
    {
        let descriptor = descriptor_of::<T>()?;
        let select = typed_select(&descriptor, query)?;

        let mut effective = query.clone();
        effective.select = select;
        let compiled = self.compiler.compile(&effective, &self.target)?;
        let raw = self.executor.execute(&compiled.native).await?;
        let content = materialize_all::<T>(
            Some(descriptor.as_ref()),
            &raw.rows,
            &effective.select,
            effective.distinct,
        );

        debug!(
            backend = self.compiler.name(),
            target = %self.target,
            model = descriptor.name,
            fetched = raw.rows.len(),
            materialized = content.len(),
            "Fetched typed rows"
        );
        Ok((content, raw.total, compiled.plan.page))
    }
}

fn typed_select(
    descriptor: &ModelDescriptor,
    query: &DynamicQuery,
) -> DataAccessResult<Vec<SelectPath>> {
    if !query.has_select() {
        return Ok(derive_select(descriptor));
    }
    let missing = missing_targets(descriptor, &query.select);
    if !missing.is_empty() {
        return Err(DataAccessError::InvalidSelect {
            model: descriptor.name.to_string(),
            missing,
        });
    }
    Ok(query.select.clone())
}

impl<C, E> DynamicRepository<C, E>
where
    C: QueryCompiler,
    E: QueryExecutor<C::Native> + TransactionManager,
{
    /// Apply a typed update payload in one transaction
    pub async fn update<M>(&self, payload: Option<&M>) -> DataAccessResult<UpdateReport>
    where
        M: Model + Serialize + Sync,
    {
        Ok(self
            .engine
            .apply_in_transaction(&self.executor, payload)
            .await?)
    }

    /// Apply a JSON payload for a registered model in one transaction
    pub async fn update_value(
        &self,
        model: &str,
        payload: Option<&Value>,
    ) -> DataAccessResult<UpdateReport> {
        Ok(self
            .engine
            .apply_value_in_transaction(&self.executor, &self.registry, model, payload)
            .await?)
    }
}
