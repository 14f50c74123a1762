//! Update-Cascade Engine
//!
//! Applies an update payload across the entity levels its model descriptor
//! declares. A level is the relation path of a leaf's source, minus the leaf:
//! `roles.roleAuthorizations.name` writes field `name` of the entity at
//! `roles.roleAuthorizations`. Top-level leaves belong to the root entity.
//!
//! Per request:
//! 1. The payload must be present and must be a registered update model.
//! 2. The root level must carry an identifier.
//! 3. A nested level without an identifier is skipped together with every
//!    level below it, even when deeper values are present.
//! 4. Every remaining level is loaded and merged before anything is saved,
//!    so a missing entity at any depth fails the request with no writes.
//! 5. Payload fields that are `null` leave the entity field untouched.
//!
//! The engine does not check that a nested entity actually belongs to its
//! parent; each level is addressed by its own identifier.

use crate::error::{ModelError, UpdateError, UpdateResult};
use crate::model::{descriptor_of, Model, ModelDescriptor, ModelRegistry};
use crate::path::{leaf_of, parent_of, PATH_SEPARATOR};
use crate::projection::lookup;
use crate::storage::{StorageError, TransactionManager, UnitOfWork, ROOT_RELATION};
use serde::Serialize;
use serde_json::Value;
use sift_config::UpdateConfig;
use tracing::{debug, info, warn};

/// One entity level that was written
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelWrite {
    /// Relation path, empty for the root
    pub relation: String,
    pub id: Value,
    /// Entity fields overwritten, in declaration order
    pub fields: Vec<String>,
}

/// Outcome of one update request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateReport {
    pub written: Vec<LevelWrite>,
    /// Relation paths skipped for lack of an identifier
    pub skipped: Vec<String>,
}

impl UpdateReport {
    /// Check if the level at `relation` was written
    pub fn wrote(&self, relation: &str) -> bool {
        self.written.iter().any(|w| w.relation == relation)
    }

    pub fn was_skipped(&self, relation: &str) -> bool {
        self.skipped.iter().any(|s| s == relation)
    }
}

#[derive(Debug)]
struct Level {
    relation: String,
    id: Option<Value>,
    fields: Vec<(String, Value)>,
}

impl Level {
    fn new(relation: String) -> Self {
        Self {
            relation,
            id: None,
            fields: Vec::new(),
        }
    }

    fn depth(&self) -> usize {
        if self.relation.is_empty() {
            0
        } else {
            self.relation.split(PATH_SEPARATOR).count()
        }
    }
}

/// Walks update payloads level by level
#[derive(Debug, Clone)]
pub struct UpdateEngine {
    id_field: String,
}

impl Default for UpdateEngine {
    fn default() -> Self {
        Self::new(&UpdateConfig::default())
    }
}

impl UpdateEngine {
    pub fn new(config: &UpdateConfig) -> Self {
        Self {
            id_field: config.id_field.clone(),
        }
    }

    /// Apply a typed payload through `uow`
    pub async fn apply<M, U>(&self, uow: &U, payload: Option<&M>) -> UpdateResult<UpdateReport>
    where
        M: Model + Serialize,
        U: UnitOfWork + ?Sized,
    {
        let payload = payload.ok_or(UpdateError::NullPayload)?;
        let descriptor = descriptor_of::<M>()?;
        let value =
            serde_json::to_value(payload).map_err(|e| ModelError::serialization(e.to_string()))?;
        self.apply_described(uow, &descriptor, &value).await
    }

    /// Apply a JSON payload for the model registered as `model`
    pub async fn apply_value<U>(
        &self,
        uow: &U,
        registry: &ModelRegistry,
        model: &str,
        payload: Option<&Value>,
    ) -> UpdateResult<UpdateReport>
    where
        U: UnitOfWork + ?Sized,
    {
        let payload = payload
            .filter(|value| !value.is_null())
            .ok_or(UpdateError::NullPayload)?;
        let descriptor = registry
            .get(model)
            .map_err(|_| UpdateError::NotAnUpdateModel(model.to_string()))?;
        self.apply_described(uow, &descriptor, payload).await
    }

    /// Apply a typed payload inside one transaction, rolling back on failure
    pub async fn apply_in_transaction<M, T>(
        &self,
        manager: &T,
        payload: Option<&M>,
    ) -> UpdateResult<UpdateReport>
    where
        M: Model + Serialize + Sync,
        T: TransactionManager + ?Sized,
    {
        let tx = manager.begin().await?;
        let result = self.apply(&tx, payload).await;
        finish(manager, tx, result).await
    }

    /// Apply a JSON payload inside one transaction, rolling back on failure
    pub async fn apply_value_in_transaction<T>(
        &self,
        manager: &T,
        registry: &ModelRegistry,
        model: &str,
        payload: Option<&Value>,
    ) -> UpdateResult<UpdateReport>
    where
        T: TransactionManager + ?Sized,
    {
        let tx = manager.begin().await?;
        let result = self.apply_value(&tx, registry, model, payload).await;
        finish(manager, tx, result).await
    }

    async fn apply_described<U>(
        &self,
        uow: &U,
        descriptor: &ModelDescriptor,
        payload: &Value,
    ) -> UpdateResult<UpdateReport>
    where
        U: UnitOfWork + ?Sized,
    {
        let levels = self.levels(descriptor, payload);
        if levels.first().and_then(|root| root.id.as_ref()).is_none() {
            return Err(UpdateError::MissingMainId {
                model: descriptor.name.to_string(),
            });
        }

        let mut report = UpdateReport::default();
        let mut active = Vec::new();
        for level in levels {
            let skipped_ancestor = report
                .skipped
                .iter()
                .any(|s| is_below(&level.relation, s));
            match level.id.clone() {
                Some(id) if !skipped_ancestor => active.push((level, id)),
                _ => {
                    debug!(relation = %level.relation, "Skipping update level without identity");
                    report.skipped.push(level.relation);
                }
            }
        }

        // Load and merge everything before the first save.
        let mut staged = Vec::with_capacity(active.len());
        for (level, id) in active {
            let entity = uow.load(&level.relation, &id).await?.ok_or_else(|| {
                UpdateError::EntityNotFound {
                    relation: display_relation(descriptor, &level.relation),
                    id: display_id(&id),
                }
            })?;
            let merged = merge(entity, &level)?;
            staged.push((level, id, merged));
        }

        for (level, id, merged) in staged {
            uow.save(&level.relation, &id, merged).await?;
            info!(
                relation = %display_relation(descriptor, &level.relation),
                id = %display_id(&id),
                fields = level.fields.len(),
                "Updated entity level"
            );
            report.written.push(LevelWrite {
                relation: level.relation,
                id,
                fields: level.fields.into_iter().map(|(name, _)| name).collect(),
            });
        }

        Ok(report)
    }

    /// Group payload values by entity level, root first, ancestors before
    /// descendants
    fn levels(&self, descriptor: &ModelDescriptor, payload: &Value) -> Vec<Level> {
        let mut levels = vec![Level::new(ROOT_RELATION.to_string())];

        for leaf in descriptor.leaves() {
            let relation = parent_of(&leaf.source).unwrap_or(ROOT_RELATION);
            let field = leaf_of(&leaf.source);
            let value = lookup(payload, &leaf.target);

            let index = match levels.iter().position(|l| l.relation == relation) {
                Some(index) => index,
                None => {
                    levels.push(Level::new(relation.to_string()));
                    levels.len() - 1
                }
            };
            let level = &mut levels[index];

            if field == self.id_field {
                if !value.is_null() {
                    level.id = Some(value);
                }
            } else if !value.is_null() {
                level.fields.push((field.to_string(), value));
            }
        }

        levels.sort_by_key(Level::depth);
        levels
    }
}

async fn finish<T>(
    manager: &T,
    tx: T::Transaction,
    result: UpdateResult<UpdateReport>,
) -> UpdateResult<UpdateReport>
where
    T: TransactionManager + ?Sized,
{
    match result {
        Ok(report) => {
            manager.commit(tx).await?;
            Ok(report)
        }
        Err(error) => {
            if let Err(rollback_error) = manager.rollback(tx).await {
                warn!(%rollback_error, "Rollback failed after update error");
            }
            Err(error)
        }
    }
}

fn merge(entity: Value, level: &Level) -> UpdateResult<Value> {
    match entity {
        Value::Object(mut map) => {
            for (name, value) in &level.fields {
                map.insert(name.clone(), value.clone());
            }
            Ok(Value::Object(map))
        }
        _ => Err(StorageError::serialization(format!(
            "entity at '{}' is not an object",
            level.relation
        ))
        .into()),
    }
}

/// Check if `relation` lies strictly below `ancestor`
fn is_below(relation: &str, ancestor: &str) -> bool {
    !ancestor.is_empty()
        && relation
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with(PATH_SEPARATOR))
}

fn display_relation(descriptor: &ModelDescriptor, relation: &str) -> String {
    if relation.is_empty() {
        descriptor.name.to_string()
    } else {
        relation.to_string()
    }
}

fn display_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Constructor, FieldDef};
    use crate::test_support::mocks::MockEntityStore;
    use serde_json::json;

    #[derive(Serialize)]
    struct RenameUser {
        id: Option<i64>,
        username: Option<String>,
        #[serde(rename = "departmentId")]
        department_id: Option<i64>,
        #[serde(rename = "departmentName")]
        department_name: Option<String>,
    }

    impl Model for RenameUser {
        fn model_name() -> &'static str {
            "RenameUser"
        }
        fn constructor() -> Constructor {
            Constructor::Record
        }
        fn fields() -> Vec<FieldDef> {
            vec![
                FieldDef::leaf("id"),
                FieldDef::leaf("username"),
                FieldDef::leaf("departmentId").source("department.id"),
                FieldDef::leaf("departmentName").source("department.name"),
            ]
        }
    }

    fn store() -> MockEntityStore {
        let store = MockEntityStore::new();
        store.insert("", json!(1), json!({"id": 1, "username": "old", "email": "a@x"}));
        store.insert("department", json!(5), json!({"id": 5, "name": "Math"}));
        store
    }

    #[tokio::test]
    async fn test_partial_update_keeps_absent_fields() {
        let store = store();
        let payload = RenameUser {
            id: Some(1),
            username: Some("new".into()),
            department_id: None,
            department_name: None,
        };

        let report = UpdateEngine::default()
            .apply_in_transaction(&store, Some(&payload))
            .await
            .unwrap();

        assert!(report.wrote(""));
        assert!(report.was_skipped("department"));
        assert_eq!(
            store.get("", &json!(1)),
            Some(json!({"id": 1, "username": "new", "email": "a@x"}))
        );
        assert_eq!(store.get("department", &json!(5)), Some(json!({"id": 5, "name": "Math"})));
    }

    #[tokio::test]
    async fn test_flat_dotted_sources_write_related_level() {
        let store = store();
        let payload = RenameUser {
            id: Some(1),
            username: None,
            department_id: Some(5),
            department_name: Some("Physics".into()),
        };

        let report = UpdateEngine::default()
            .apply_in_transaction(&store, Some(&payload))
            .await
            .unwrap();

        assert_eq!(report.written.len(), 2);
        assert_eq!(report.written[1].fields, vec!["name".to_string()]);
        assert_eq!(
            store.get("department", &json!(5)),
            Some(json!({"id": 5, "name": "Physics"}))
        );
    }

    #[tokio::test]
    async fn test_null_payload() {
        let store = store();
        let result = UpdateEngine::default()
            .apply_in_transaction::<RenameUser, _>(&store, None)
            .await;

        assert!(matches!(result, Err(UpdateError::NullPayload)));
        assert_eq!(store.stats().rollbacks, 1);
    }

    #[tokio::test]
    async fn test_missing_nested_entity_writes_nothing() {
        let store = store();
        let payload = RenameUser {
            id: Some(1),
            username: Some("new".into()),
            department_id: Some(99),
            department_name: Some("Ghost".into()),
        };

        let err = UpdateEngine::default()
            .apply_in_transaction(&store, Some(&payload))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "No entity found with ID 99 for department");
        assert_eq!(store.stats().saves, 0);
        assert_eq!(store.get("", &json!(1)).unwrap()["username"], json!("old"));
    }

    #[tokio::test]
    async fn test_unregistered_dynamic_model() {
        let store = store();
        let registry = ModelRegistry::new();
        let err = UpdateEngine::default()
            .apply_value_in_transaction(&store, &registry, "Plain", Some(&json!({"id": 1})))
            .await
            .unwrap_err();

        assert!(matches!(err, UpdateError::NotAnUpdateModel(ref name) if name == "Plain"));
    }

    #[tokio::test]
    async fn test_dynamic_null_payload() {
        let store = store();
        let registry = ModelRegistry::new();
        registry.register::<RenameUser>().unwrap();
        let err = UpdateEngine::default()
            .apply_value_in_transaction(&store, &registry, "RenameUser", Some(&Value::Null))
            .await
            .unwrap_err();

        assert!(matches!(err, UpdateError::NullPayload));
    }

    #[test]
    fn test_is_below() {
        assert!(is_below("roles.auth", "roles"));
        assert!(!is_below("rolesx", "roles"));
        assert!(!is_below("roles", "roles"));
        assert!(!is_below("roles", ""));
    }
}
