//! Mock Implementations for Testing
//!
//! [`MockEntityStore`] is an in-memory entity store addressed by
//! `(relation, id)`. It implements [`TransactionManager`]; writes made
//! through a [`MockTransaction`] are staged and only become visible on
//! commit.
//!
//! - **Observable**: every begin, load, save, commit and rollback is counted
//! - **Configurable**: saves to a chosen relation can be made to fail
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use sift_core::storage::{TransactionManager, UnitOfWork};
//! use sift_core::test_support::mocks::MockEntityStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MockEntityStore::new();
//! store.insert("", json!(1), json!({"id": 1, "name": "old"}));
//!
//! let tx = store.begin().await?;
//! tx.save("", &json!(1), json!({"id": 1, "name": "new"})).await?;
//! assert_eq!(store.get("", &json!(1)).unwrap()["name"], "old");
//!
//! store.commit(tx).await?;
//! assert_eq!(store.get("", &json!(1)).unwrap()["name"], "new");
//! assert_eq!(store.stats().commits, 1);
//! # Ok(())
//! # }
//! ```

use crate::storage::{StorageError, StorageResult, TransactionManager, UnitOfWork};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Mock Entity Store
// ============================================================================

/// Operation counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockStats {
    pub begins: usize,
    pub loads: usize,
    pub saves: usize,
    pub commits: usize,
    pub rollbacks: usize,
}

#[derive(Debug, Default)]
struct MockState {
    entities: HashMap<String, HashMap<String, Value>>,
    stats: MockStats,
    failing_relation: Option<String>,
}

/// In-memory transactional entity store
#[derive(Debug, Clone, Default)]
pub struct MockEntityStore {
    state: Arc<RwLock<MockState>>,
}

impl MockEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entity outside any transaction
    pub fn insert(&self, relation: &str, id: Value, entity: Value) {
        self.state
            .write()
            .entities
            .entry(relation.to_string())
            .or_default()
            .insert(id_key(&id), entity);
    }

    /// Committed state of one entity
    pub fn get(&self, relation: &str, id: &Value) -> Option<Value> {
        self.state
            .read()
            .entities
            .get(relation)
            .and_then(|rows| rows.get(&id_key(id)))
            .cloned()
    }

    pub fn stats(&self) -> MockStats {
        self.state.read().stats.clone()
    }

    /// Make every save to `relation` fail with a backend error
    pub fn fail_saves_on(&self, relation: &str) {
        self.state.write().failing_relation = Some(relation.to_string());
    }

    /// Clear data, statistics and injected failures
    pub fn reset(&self) {
        *self.state.write() = MockState::default();
    }
}

fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Open transaction over a [`MockEntityStore`]
#[derive(Debug)]
pub struct MockTransaction {
    state: Arc<RwLock<MockState>>,
    staged: Mutex<Vec<(String, String, Value)>>,
}

#[async_trait]
impl UnitOfWork for MockTransaction {
    async fn load(&self, relation: &str, id: &Value) -> StorageResult<Option<Value>> {
        let key = id_key(id);
        let staged = self
            .staged
            .lock()
            .iter()
            .rev()
            .find(|(r, k, _)| r == relation && *k == key)
            .map(|(_, _, entity)| entity.clone());

        let mut state = self.state.write();
        state.stats.loads += 1;
        Ok(staged.or_else(|| {
            state
                .entities
                .get(relation)
                .and_then(|rows| rows.get(&key))
                .cloned()
        }))
    }

    async fn save(&self, relation: &str, id: &Value, entity: Value) -> StorageResult<()> {
        {
            let mut state = self.state.write();
            if state.failing_relation.as_deref() == Some(relation) {
                return Err(StorageError::backend(format!(
                    "injected save failure for '{}'",
                    relation
                )));
            }
            state.stats.saves += 1;
        }
        self.staged
            .lock()
            .push((relation.to_string(), id_key(id), entity));
        Ok(())
    }
}

#[async_trait]
impl TransactionManager for MockEntityStore {
    type Transaction = MockTransaction;

    async fn begin(&self) -> StorageResult<MockTransaction> {
        self.state.write().stats.begins += 1;
        Ok(MockTransaction {
            state: Arc::clone(&self.state),
            staged: Mutex::new(Vec::new()),
        })
    }

    async fn commit(&self, tx: MockTransaction) -> StorageResult<()> {
        let staged = tx.staged.into_inner();
        let mut state = self.state.write();
        for (relation, key, entity) in staged {
            state
                .entities
                .entry(relation)
                .or_default()
                .insert(key, entity);
        }
        state.stats.commits += 1;
        Ok(())
    }

    async fn rollback(&self, tx: MockTransaction) -> StorageResult<()> {
        drop(tx);
        self.state.write().stats.rollbacks += 1;
        Ok(())
    }
}
