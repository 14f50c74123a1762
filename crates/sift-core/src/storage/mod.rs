//! Storage collaborator abstractions
//!
//! The core never talks to a database itself. It hands compiled queries to a
//! [`QueryExecutor`] and performs update-cascade writes through a
//! [`UnitOfWork`] obtained from a [`TransactionManager`].
//!
//! # Relations
//!
//! Entities reached by the update cascade are addressed by their relation
//! path from the root entity (`"roles"`, `"roles.roleAuthorizations"`), with
//! [`ROOT_RELATION`] naming the root entity itself.
//!
//! # Thread Safety
//!
//! Implementations must be `Send + Sync`. Timeouts and cancellation belong to
//! the implementation; the core has neither.

mod error;

pub use error::{StorageError, StorageResult};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Relation path of the root entity
pub const ROOT_RELATION: &str = "";

/// Rows returned by one query execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPage {
    /// Raw rows or documents, in result order
    pub rows: Vec<Value>,
    /// Total matches ignoring pagination
    pub total: u64,
}

impl RawPage {
    /// Create a page
    pub fn new(rows: Vec<Value>, total: u64) -> Self {
        Self { rows, total }
    }
}

/// Executes a backend-native query
#[async_trait]
pub trait QueryExecutor<Q: Sync>: Send + Sync {
    /// Run the query, honouring its pagination, and report the total count
    async fn execute(&self, query: &Q) -> StorageResult<RawPage>;

    /// Count matches without fetching rows
    async fn count(&self, query: &Q) -> StorageResult<u64> {
        Ok(self.execute(query).await?.total)
    }
}

/// Entity access inside one transactional scope
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Load the entity at `relation` with identifier `id`
    ///
    /// Returns `None` if no such entity exists.
    async fn load(&self, relation: &str, id: &Value) -> StorageResult<Option<Value>>;

    /// Save (merge) the entity at `relation` with identifier `id`
    async fn save(&self, relation: &str, id: &Value, entity: Value) -> StorageResult<()>;
}

/// Begins and ends transactional scopes
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Handle for one open transaction
    type Transaction: UnitOfWork;

    /// Open a transaction
    async fn begin(&self) -> StorageResult<Self::Transaction>;

    /// Make every write of the transaction visible
    async fn commit(&self, tx: Self::Transaction) -> StorageResult<()>;

    /// Discard every write of the transaction
    async fn rollback(&self, tx: Self::Transaction) -> StorageResult<()>;
}

/// Blanket implementation of QueryExecutor for Arc<T>
#[async_trait]
impl<Q: Sync, T: QueryExecutor<Q> + ?Sized> QueryExecutor<Q> for std::sync::Arc<T> {
    async fn execute(&self, query: &Q) -> StorageResult<RawPage> {
        (**self).execute(query).await
    }

    async fn count(&self, query: &Q) -> StorageResult<u64> {
        (**self).count(query).await
    }
}
