//! Multi-level update cascade against the mock entity store.
//!
//! Levels: admin (root) -> roles -> roles.roleAuthorizations
//! -> roles.roleAuthorizations.authorization

use serde::Serialize;
use serde_json::{json, Value};
use sift_core::model::{Constructor, FieldDef, Model};
use sift_core::test_support::mocks::MockEntityStore;
use sift_core::{ModelRegistry, StorageError, UpdateEngine, UpdateError};

// ============================================================================
// Nested update models
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizationUpdate {
    id: Option<i64>,
    menu_icon: Option<String>,
}

impl Model for AuthorizationUpdate {
    fn model_name() -> &'static str {
        "AuthorizationUpdate"
    }
    fn constructor() -> Constructor {
        Constructor::class::<Self>()
    }
    fn fields() -> Vec<FieldDef> {
        vec![FieldDef::leaf("id"), FieldDef::leaf("menuIcon")]
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoleAuthorizationUpdate {
    id: Option<i64>,
    authorization: AuthorizationUpdate,
}

impl Model for RoleAuthorizationUpdate {
    fn model_name() -> &'static str {
        "RoleAuthorizationUpdate"
    }
    fn constructor() -> Constructor {
        Constructor::class::<Self>()
    }
    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::leaf("id"),
            FieldDef::sub_model::<AuthorizationUpdate>("authorization"),
        ]
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoleUpdate {
    id: Option<i64>,
    name: Option<String>,
    role_authorizations: RoleAuthorizationUpdate,
}

impl Model for RoleUpdate {
    fn model_name() -> &'static str {
        "RoleUpdate"
    }
    fn constructor() -> Constructor {
        Constructor::class::<Self>()
    }
    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::leaf("id"),
            FieldDef::leaf("name"),
            FieldDef::sub_model::<RoleAuthorizationUpdate>("roleAuthorizations"),
        ]
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct AdminUserUpdate {
    id: Option<i64>,
    username: Option<String>,
    roles: RoleUpdate,
}

impl Model for AdminUserUpdate {
    fn model_name() -> &'static str {
        "AdminUserUpdate"
    }
    fn constructor() -> Constructor {
        Constructor::class::<Self>()
    }
    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::leaf("id"),
            FieldDef::leaf("username"),
            FieldDef::sub_model::<RoleUpdate>("roles"),
        ]
    }
}

// ============================================================================
// Flat update model with dotted source paths
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct AdminUserFlatUpdate {
    id: Option<i64>,
    username: Option<String>,
    role_id: Option<i64>,
    role_name: Option<String>,
    role_authorization_id: Option<i64>,
    authorization_id: Option<i64>,
    menu_icon: Option<String>,
}

impl Model for AdminUserFlatUpdate {
    fn model_name() -> &'static str {
        "AdminUserFlatUpdate"
    }
    fn constructor() -> Constructor {
        Constructor::Record
    }
    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::leaf("id"),
            FieldDef::leaf("username"),
            FieldDef::leaf("roleId").source("roles.id"),
            FieldDef::leaf("roleName").source("roles.name"),
            FieldDef::leaf("roleAuthorizationId").source("roles.roleAuthorizations.id"),
            FieldDef::leaf("authorizationId").source("roles.roleAuthorizations.authorization.id"),
            FieldDef::leaf("menuIcon").source("roles.roleAuthorizations.authorization.menuIcon"),
        ]
    }
}

const ROLES: &str = "roles";
const ROLE_AUTHS: &str = "roles.roleAuthorizations";
const AUTHS: &str = "roles.roleAuthorizations.authorization";

fn seeded_store() -> MockEntityStore {
    let store = MockEntityStore::new();
    store.insert("", json!(1), json!({"id": 1, "username": "admin", "email": "admin@x"}));
    store.insert(ROLES, json!(10), json!({"id": 10, "name": "ADMIN"}));
    store.insert(ROLE_AUTHS, json!(100), json!({"id": 100}));
    store.insert(AUTHS, json!(1000), json!({"id": 1000, "menuIcon": "old-icon"}));
    store
}

fn full_payload() -> AdminUserUpdate {
    AdminUserUpdate {
        id: Some(1),
        username: Some("root".into()),
        roles: RoleUpdate {
            id: Some(10),
            name: Some("SUPER".into()),
            role_authorizations: RoleAuthorizationUpdate {
                id: Some(100),
                authorization: AuthorizationUpdate {
                    id: Some(1000),
                    menu_icon: Some("new-icon".into()),
                },
            },
        },
    }
}

fn entity(store: &MockEntityStore, relation: &str, id: i64) -> Value {
    store.get(relation, &json!(id)).unwrap_or(Value::Null)
}

#[tokio::test]
async fn test_four_levels_written_atomically() {
    let store = seeded_store();
    let report = UpdateEngine::default()
        .apply_in_transaction(&store, Some(&full_payload()))
        .await
        .unwrap();

    let relations: Vec<&str> = report.written.iter().map(|w| w.relation.as_str()).collect();
    assert_eq!(relations, vec!["", ROLES, ROLE_AUTHS, AUTHS]);
    assert!(report.skipped.is_empty());

    assert_eq!(entity(&store, "", 1)["username"], "root");
    assert_eq!(entity(&store, "", 1)["email"], "admin@x");
    assert_eq!(entity(&store, ROLES, 10)["name"], "SUPER");
    assert_eq!(entity(&store, AUTHS, 1000)["menuIcon"], "new-icon");

    let stats = store.stats();
    assert_eq!(stats.saves, 4);
    assert_eq!(stats.commits, 1);
    assert_eq!(stats.rollbacks, 0);
}

#[tokio::test]
async fn test_missing_level_id_skips_subtree() {
    let store = seeded_store();
    let mut payload = full_payload();
    payload.roles.role_authorizations.id = None;

    let report = UpdateEngine::default()
        .apply_in_transaction(&store, Some(&payload))
        .await
        .unwrap();

    assert!(report.wrote(""));
    assert!(report.wrote(ROLES));
    assert!(report.was_skipped(ROLE_AUTHS));
    assert!(report.was_skipped(AUTHS));
    assert_eq!(
        entity(&store, AUTHS, 1000),
        json!({"id": 1000, "menuIcon": "old-icon"})
    );
    assert_eq!(entity(&store, ROLE_AUTHS, 100), json!({"id": 100}));
}

#[tokio::test]
async fn test_nested_level_without_id_leaves_entity_untouched() {
    let store = seeded_store();
    let before = entity(&store, ROLES, 10);
    let payload = AdminUserUpdate {
        id: Some(1),
        username: Some("renamed".into()),
        roles: RoleUpdate {
            id: None,
            name: Some("IGNORED".into()),
            ..RoleUpdate::default()
        },
    };

    UpdateEngine::default()
        .apply_in_transaction(&store, Some(&payload))
        .await
        .unwrap();

    assert_eq!(entity(&store, ROLES, 10), before);
    assert_eq!(entity(&store, "", 1)["username"], "renamed");
}

#[tokio::test]
async fn test_missing_root_id_fails_before_any_write() {
    let store = seeded_store();
    let before = entity(&store, "", 1);
    let mut payload = full_payload();
    payload.id = None;

    let err = UpdateEngine::default()
        .apply_in_transaction(&store, Some(&payload))
        .await
        .unwrap_err();

    assert!(matches!(err, UpdateError::MissingMainId { .. }));
    assert!(err.to_string().contains("Main entity ID is required"));
    assert_eq!(entity(&store, "", 1), before);
    assert_eq!(store.stats().saves, 0);
    assert_eq!(store.stats().rollbacks, 1);
}

#[tokio::test]
async fn test_unknown_root_id() {
    let store = seeded_store();
    let mut payload = full_payload();
    payload.id = Some(42);

    let err = UpdateEngine::default()
        .apply_in_transaction(&store, Some(&payload))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "No entity found with ID 42 for AdminUserUpdate");
    assert_eq!(store.stats().saves, 0);
}

#[tokio::test]
async fn test_missing_deep_entity_aborts_all_levels() {
    let store = seeded_store();
    let mut payload = full_payload();
    payload.roles.role_authorizations.authorization.id = Some(9999);

    let err = UpdateEngine::default()
        .apply_in_transaction(&store, Some(&payload))
        .await
        .unwrap_err();

    assert!(matches!(err, UpdateError::EntityNotFound { ref relation, .. } if relation == AUTHS));
    assert_eq!(entity(&store, "", 1)["username"], "admin");
    assert_eq!(entity(&store, ROLES, 10)["name"], "ADMIN");
}

#[tokio::test]
async fn test_storage_failure_rolls_back() {
    let store = seeded_store();
    store.fail_saves_on(AUTHS);

    let err = UpdateEngine::default()
        .apply_in_transaction(&store, Some(&full_payload()))
        .await
        .unwrap_err();

    assert!(matches!(err, UpdateError::Storage(StorageError::Backend(_))));
    assert!(!err.is_validation());
    assert_eq!(entity(&store, "", 1)["username"], "admin");
    assert_eq!(store.stats().commits, 0);
    assert_eq!(store.stats().rollbacks, 1);
}

#[tokio::test]
async fn test_flat_dotted_model_matches_nested_model() {
    let store = seeded_store();
    let payload = AdminUserFlatUpdate {
        id: Some(1),
        username: None,
        role_id: Some(10),
        role_name: Some("FLAT".into()),
        role_authorization_id: Some(100),
        authorization_id: Some(1000),
        menu_icon: Some("flat-icon".into()),
    };

    let report = UpdateEngine::default()
        .apply_in_transaction(&store, Some(&payload))
        .await
        .unwrap();

    assert_eq!(report.written.len(), 4);
    assert_eq!(entity(&store, "", 1)["username"], "admin");
    assert_eq!(entity(&store, ROLES, 10)["name"], "FLAT");
    assert_eq!(entity(&store, AUTHS, 1000)["menuIcon"], "flat-icon");
}

#[tokio::test]
async fn test_flat_model_skips_below_missing_id() {
    let store = seeded_store();
    let payload = AdminUserFlatUpdate {
        id: Some(1),
        role_id: Some(10),
        role_authorization_id: None,
        authorization_id: Some(1000),
        menu_icon: Some("ignored".into()),
        ..AdminUserFlatUpdate::default()
    };

    let report = UpdateEngine::default()
        .apply_in_transaction(&store, Some(&payload))
        .await
        .unwrap();

    assert_eq!(report.skipped, vec![ROLE_AUTHS.to_string(), AUTHS.to_string()]);
    assert_eq!(entity(&store, AUTHS, 1000)["menuIcon"], "old-icon");
}

#[tokio::test]
async fn test_dynamic_payload_through_registry() {
    let store = seeded_store();
    let registry = ModelRegistry::new();
    registry.register::<AdminUserUpdate>().unwrap();

    let payload = json!({
        "id": 1,
        "username": "dynamic",
        "roles": {"id": 10, "name": "DYN"}
    });
    let report = UpdateEngine::default()
        .apply_value_in_transaction(&store, &registry, "AdminUserUpdate", Some(&payload))
        .await
        .unwrap();

    assert_eq!(report.written.len(), 2);
    assert!(report.was_skipped(ROLE_AUTHS));
    assert_eq!(entity(&store, ROLES, 10)["name"], "DYN");
}
