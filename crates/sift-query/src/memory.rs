//! In-memory document store.
//!
//! [`MemoryCollection`] executes [`DocumentQuery`]s with the same dotted-path
//! semantics as [`DocumentFilter::matches`](crate::DocumentFilter::matches).
//! [`MemoryStore`] groups named collections, dispatches queries by collection
//! name and implements the update collaborator traits, so a repository can
//! run end to end without a database.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use sift_core::{DynamicQuery, QueryExecutor};
//! use sift_query::{DocumentCompiler, MemoryCollection, QueryCompiler};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let people = MemoryCollection::new();
//! people.insert_many([json!({"name": "Ann", "age": 41}), json!({"name": "Bob", "age": 22})]);
//!
//! let query = DynamicQuery::builder().greater_than("age", 30).build();
//! let compiled = DocumentCompiler::default().compile(&query, "people")?;
//! let page = people.execute(&compiled.native).await?;
//!
//! assert_eq!(page.total, 1);
//! assert_eq!(page.rows[0]["name"], "Ann");
//! # Ok(())
//! # }
//! ```

use crate::compare::{canonical_cmp, loose_eq};
use crate::compile::{values_at, DocumentQuery, DocumentSort};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use sift_config::UpdateConfig;
use sift_core::projection::project_untyped;
use sift_core::storage::ROOT_RELATION;
use sift_core::{
    Order, QueryExecutor, RawPage, SelectPath, StorageError, StorageResult, TransactionManager,
    UnitOfWork,
};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

// ============================================================================
// Collection
// ============================================================================

/// Ordered set of documents
#[derive(Debug, Default)]
pub struct MemoryCollection {
    documents: RwLock<Vec<Value>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, document: Value) {
        self.documents.write().push(document);
    }

    pub fn insert_many(&self, documents: impl IntoIterator<Item = Value>) {
        self.documents.write().extend(documents);
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Copy of every document in insertion order
    pub fn snapshot(&self) -> Vec<Value> {
        self.documents.read().clone()
    }

    /// Run a query: filter, stable sort, projection, distinct, then skip/limit.
    ///
    /// `total` counts rows after de-duplication, so distinct pages stay full.
    pub fn find(&self, query: &DocumentQuery) -> RawPage {
        let documents = self.documents.read();
        let selected = Self::select_rows(&documents, query);
        let total = selected.len() as u64;

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let rows: Vec<Value> = selected
            .into_iter()
            .skip(skip)
            .take(query.limit as usize)
            .collect();

        trace!(
            collection = %query.collection,
            total,
            returned = rows.len(),
            distinct = query.distinct,
            "Executed document query in memory"
        );
        RawPage::new(rows, total)
    }

    fn select_rows(documents: &[Value], query: &DocumentQuery) -> Vec<Value> {
        let mut matched: Vec<&Value> = documents
            .iter()
            .filter(|doc| query.filter.matches(doc))
            .collect();
        if !query.sort.is_empty() {
            matched.sort_by(|a, b| compare_documents(a, b, &query.sort));
        }

        let select: Vec<SelectPath> = query.projection.iter().map(SelectPath::same).collect();
        let projected = matched.into_iter().map(|doc| {
            if select.is_empty() {
                doc.clone()
            } else {
                project_untyped(doc, &select)
            }
        });

        if !query.distinct {
            return projected.collect();
        }
        let mut seen = HashSet::new();
        projected
            .filter(|row| seen.insert(row.to_string()))
            .collect()
    }

    fn position_of(documents: &[Value], id_field: &str, id: &Value) -> Option<usize> {
        documents.iter().position(|doc| {
            doc.get(id_field)
                .is_some_and(|candidate| loose_eq(candidate, id))
        })
    }

    fn get_by_id(&self, id_field: &str, id: &Value) -> Option<Value> {
        let documents = self.documents.read();
        Self::position_of(&documents, id_field, id).map(|idx| documents[idx].clone())
    }

    fn upsert(&self, id_field: &str, id: &Value, entity: Value) {
        let mut documents = self.documents.write();
        match Self::position_of(&documents, id_field, id) {
            Some(idx) => documents[idx] = entity,
            None => documents.push(entity),
        }
    }
}

/// Ascending uses the smallest value on a path, descending the largest
fn sort_value<'a>(document: &'a Value, key: &DocumentSort) -> Option<&'a Value> {
    let values = values_at(document, &key.field).into_iter();
    match key.direction {
        Order::Asc => values.min_by(|a, b| canonical_cmp(a, b)),
        Order::Desc => values.max_by(|a, b| canonical_cmp(a, b)),
    }
}

fn compare_documents(a: &Value, b: &Value, sort: &[DocumentSort]) -> Ordering {
    for key in sort {
        let left = sort_value(a, key).unwrap_or(&Value::Null);
        let right = sort_value(b, key).unwrap_or(&Value::Null);
        let ordering = match key.direction {
            Order::Asc => canonical_cmp(left, right),
            Order::Desc => canonical_cmp(right, left),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl QueryExecutor<DocumentQuery> for MemoryCollection {
    async fn execute(&self, query: &DocumentQuery) -> StorageResult<RawPage> {
        Ok(self.find(query))
    }

    async fn count(&self, query: &DocumentQuery) -> StorageResult<u64> {
        let documents = self.documents.read();
        if query.distinct {
            return Ok(Self::select_rows(&documents, query).len() as u64);
        }
        Ok(documents.iter().filter(|doc| query.filter.matches(doc)).count() as u64)
    }
}

// ============================================================================
// Store
// ============================================================================

#[derive(Debug)]
struct StoreInner {
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
    relations: RwLock<HashMap<String, String>>,
    root: String,
    id_field: String,
}

/// Named collections plus a relation mapping for updates
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    /// Store whose root entities live in `root_collection`
    pub fn new(root_collection: impl Into<String>, config: &UpdateConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                collections: RwLock::new(HashMap::new()),
                relations: RwLock::new(HashMap::new()),
                root: root_collection.into(),
                id_field: config.id_field.clone(),
            }),
        }
    }

    /// Collection by name, created on first use
    pub fn collection(&self, name: &str) -> Arc<MemoryCollection> {
        if let Some(existing) = self.inner.collections.read().get(name) {
            return Arc::clone(existing);
        }
        let mut collections = self.inner.collections.write();
        Arc::clone(collections.entry(name.to_string()).or_default())
    }

    /// Entities of `relation` are stored in `collection`
    pub fn relate(&self, relation: impl Into<String>, collection: impl Into<String>) -> &Self {
        self.inner
            .relations
            .write()
            .insert(relation.into(), collection.into());
        self
    }

    pub fn insert(&self, collection: &str, document: Value) {
        self.collection(collection).insert(document);
    }

    /// Committed entity by identifier
    pub fn get(&self, collection: &str, id: &Value) -> Option<Value> {
        self.inner
            .collections
            .read()
            .get(collection)
            .and_then(|c| c.get_by_id(&self.inner.id_field, id))
    }

    fn collection_for(&self, relation: &str) -> StorageResult<String> {
        if relation == ROOT_RELATION {
            return Ok(self.inner.root.clone());
        }
        self.inner
            .relations
            .read()
            .get(relation)
            .cloned()
            .ok_or_else(|| StorageError::UnknownRelation(relation.to_string()))
    }
}

#[async_trait]
impl QueryExecutor<DocumentQuery> for MemoryStore {
    async fn execute(&self, query: &DocumentQuery) -> StorageResult<RawPage> {
        let collection = self.inner.collections.read().get(&query.collection).cloned();
        match collection {
            Some(collection) => collection.execute(query).await,
            None => {
                debug!(collection = %query.collection, "Querying missing collection");
                Ok(RawPage::default())
            }
        }
    }
}

/// Open transaction over a [`MemoryStore`]; writes apply on commit
#[derive(Debug)]
pub struct MemoryTransaction {
    store: MemoryStore,
    staged: Mutex<Vec<(String, Value, Value)>>,
}

#[async_trait]
impl UnitOfWork for MemoryTransaction {
    async fn load(&self, relation: &str, id: &Value) -> StorageResult<Option<Value>> {
        let collection = self.store.collection_for(relation)?;
        let id_field = &self.store.inner.id_field;

        let staged = self
            .staged
            .lock()
            .iter()
            .rev()
            .find(|(c, staged_id, _)| *c == collection && loose_eq(staged_id, id))
            .map(|(_, _, entity)| entity.clone());
        if staged.is_some() {
            return Ok(staged);
        }

        Ok(self
            .store
            .inner
            .collections
            .read()
            .get(&collection)
            .and_then(|c| c.get_by_id(id_field, id)))
    }

    async fn save(&self, relation: &str, id: &Value, entity: Value) -> StorageResult<()> {
        let collection = self.store.collection_for(relation)?;
        self.staged.lock().push((collection, id.clone(), entity));
        Ok(())
    }
}

#[async_trait]
impl TransactionManager for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> StorageResult<MemoryTransaction> {
        Ok(MemoryTransaction {
            store: self.clone(),
            staged: Mutex::new(Vec::new()),
        })
    }

    async fn commit(&self, tx: MemoryTransaction) -> StorageResult<()> {
        let staged = tx.staged.into_inner();
        let writes = staged.len();
        for (collection, id, entity) in staged {
            self.collection(&collection)
                .upsert(&self.inner.id_field, &id, entity);
        }
        debug!(writes, "Committed memory transaction");
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTransaction) -> StorageResult<()> {
        let discarded = tx.staged.into_inner().len();
        debug!(discarded, "Rolled back memory transaction");
        Ok(())
    }
}
