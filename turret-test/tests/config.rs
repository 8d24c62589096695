use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use turret_data::{record, ConfigError, DataError, EntityParameter, Turret};
use turret_test::{entity, init_tracing, MemoryAdapter};

const ENTITIES: &str = r#"
entities:
  user:
    options:
      table: users
  post:
    options:
      table: posts
      id: post_id
"#;

#[test]
fn test_unknown_configuration() {
    init_tracing();
    let turret = Turret::new();

    let err = turret.create_controller("missing").unwrap_err();
    assert_eq!(err, ConfigError::UnknownConfiguration("missing".into()));
    assert_eq!(
        err.to_string(),
        "Unknown controller configuration \"missing\""
    );
}

#[test]
fn test_unknown_entity() {
    let turret = Turret::new();
    turret.configure("main", Arc::new(MemoryAdapter::new()), HashMap::new());
    let controller = turret.create_controller("main").unwrap();

    let err = controller.get_repository("ghost").unwrap_err();
    assert!(matches!(
        err,
        DataError::Config(ConfigError::UnknownEntity(ref name)) if name == "ghost"
    ));
    assert_eq!(err.to_string(), "Configuration error: Unknown entity \"ghost\"");
}

#[tokio::test]
async fn test_yaml_configuration() {
    init_tracing();
    let adapter = MemoryAdapter::new();
    let turret = Turret::new();
    turret
        .configure_yaml("main", Arc::new(adapter.clone()), ENTITIES)
        .unwrap();
    let controller = turret.create_controller("main").unwrap();

    controller
        .start_session(|uow| async move {
            uow.get_repository("user")?.add(record(json!({"name": "a"})))?;
            uow.get_repository("post")?.add(record(json!({"post_id": 7})))?;
            Ok::<_, DataError>(())
        })
        .await
        .unwrap();

    assert_eq!(adapter.rows("users").len(), 1);
    let persisted = &adapter.journal().executed()[1];
    assert_eq!(persisted.statement, "persist posts");
    assert_eq!(persisted.binds[1], json!("post_id"));
}

#[test]
fn test_invalid_yaml_is_a_load_error() {
    let turret = Turret::new();
    let result = turret.configure_yaml("main", Arc::new(MemoryAdapter::new()), "- a\n- b\n");
    assert!(matches!(result, Err(ConfigError::Load(_))));
    assert!(turret.names().is_empty());
}

#[tokio::test]
async fn test_set_adapter_redirects_controllers() {
    let first = MemoryAdapter::new();
    let second = MemoryAdapter::new();
    let turret = Turret::new();
    turret.configure(
        "main",
        Arc::new(first.clone()),
        HashMap::from([("user".to_string(), entity("users"))]),
    );
    let controller = turret.create_controller("main").unwrap();

    turret
        .configuration("main")
        .unwrap()
        .set_adapter(Arc::new(second.clone()));
    controller.get_repository("user").unwrap().find_all().await.unwrap();

    assert_eq!(first.journal().sessions_created(), 0);
    assert_eq!(second.journal().sessions_created(), 1);
}

#[test]
fn test_entities_registered_after_configure() {
    let turret = Turret::new();
    turret.configure("main", Arc::new(MemoryAdapter::new()), HashMap::new());
    let controller = turret.create_controller("main").unwrap();
    assert!(controller.get_repository("tag").is_err());

    let configuration = turret.configuration("main").unwrap();
    configuration.set_entity_parameter("tag", EntityParameter::default());
    assert!(controller.get_repository("tag").is_ok());
    assert_eq!(configuration.entity_names(), vec!["tag".to_string()]);
}

#[test]
fn test_reconfigure_replaces_configuration() {
    let turret = Turret::new();
    turret.configure("main", Arc::new(MemoryAdapter::new()), HashMap::new());
    let controller = turret.create_controller("main").unwrap();

    turret.configure(
        "main",
        Arc::new(MemoryAdapter::new()),
        HashMap::from([("user".to_string(), entity("users"))]),
    );
    assert!(controller.get_repository("user").is_ok());
    assert_eq!(turret.names(), vec!["main".to_string()]);
}

#[test]
fn test_turret_clones_share_registry() {
    let turret = Turret::new();
    let clone = turret.clone();
    clone.configure("other", Arc::new(MemoryAdapter::new()), HashMap::new());

    assert!(turret.create_controller("other").is_ok());
    assert_eq!(turret.create_controller("other").unwrap().name(), "other");
}
