use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use turret_data::{record, Controller, DataError, Direction, Record, Repository, Turret};
use turret_test::{entity, init_tracing, FailPoint, MemoryAdapter};

fn setup() -> (MemoryAdapter, Turret, Controller) {
    init_tracing();
    let adapter = MemoryAdapter::new();
    let turret = Turret::new();
    turret.configure(
        "main",
        Arc::new(adapter.clone()),
        HashMap::from([
            ("user".to_string(), entity("users")),
            ("post".to_string(), entity("posts")),
            (
                "member".to_string(),
                entity("members")
                    .with_entity_factory(|| record(json!({"active": true, "role": "guest"}))),
            ),
        ]),
    );
    let controller = turret.create_controller("main").unwrap();
    (adapter, turret, controller)
}

fn seed_users(adapter: &MemoryAdapter) {
    for (id, name, active) in [(1, "carol", true), (2, "alice", false), (3, "bob", true)] {
        adapter.insert("users", record(json!({"id": id, "name": name, "active": active})));
    }
}

fn names(rows: Vec<Record>) -> Vec<String> {
    rows.into_iter()
        .filter_map(|row| row.get("name").and_then(|n| n.as_str()).map(String::from))
        .collect()
}

// ── Staging and flush ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_add_only_stages() {
    let (adapter, _turret, controller) = setup();
    let users = controller.get_repository("user").unwrap();

    users.add(record(json!({"name": "a"}))).unwrap();
    users.add(record(json!({"name": "a"}))).unwrap();
    users.remove(record(json!({"id": 9}))).unwrap();

    assert_eq!(users.pending_persist_count(), 2);
    assert_eq!(users.pending_remove_count(), 1);
    assert!(users.is_dirty());
    assert!(controller.has_pending_changes());
    assert!(adapter.journal().events().is_empty());
}

#[tokio::test]
async fn test_flush_drains_fifo() {
    let (adapter, _turret, controller) = setup();
    let users = controller.get_repository("user").unwrap();
    for i in 1..=5 {
        users.add(record(json!({ "id": i }))).unwrap();
    }

    controller.flush().await.unwrap();

    let ids: Vec<_> = adapter
        .journal()
        .executed()
        .into_iter()
        .map(|p| p.binds[0]["id"].clone())
        .collect();
    assert_eq!(ids, vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);
    assert!(!users.is_dirty());
    assert!(!controller.has_pending_changes());
}

#[tokio::test]
async fn test_persistence_precedes_removal() {
    let (adapter, _turret, controller) = setup();
    adapter.insert("users", record(json!({"id": 1})));
    let users = controller.get_repository("user").unwrap();
    let posts = controller.get_repository("post").unwrap();

    users.remove(record(json!({"id": 1}))).unwrap();
    posts.add(record(json!({"id": 10}))).unwrap();
    users.add(record(json!({"id": 2}))).unwrap();

    controller.flush().await.unwrap();

    let statements: Vec<_> = adapter
        .journal()
        .executed()
        .into_iter()
        .map(|p| p.statement)
        .collect();
    assert_eq!(statements, vec!["persist posts", "persist users", "remove users"]);
    assert_eq!(adapter.rows("users"), vec![record(json!({"id": 2}))]);
}

#[tokio::test]
async fn test_flush_outside_unit_of_work_uses_owned_sessions() {
    let (adapter, _turret, controller) = setup();
    let users = controller.get_repository("user").unwrap();
    users.add(record(json!({"id": 1}))).unwrap();
    users.add(record(json!({"id": 2}))).unwrap();

    controller.flush().await.unwrap();

    let journal = adapter.journal();
    assert_eq!(journal.sessions_created(), 2);
    assert_eq!(journal.ends(), 2);
    assert_eq!(journal.begins(), 0);
    assert_eq!(journal.commits(), 0);
    assert_eq!(adapter.rows("users").len(), 2);
}

#[tokio::test]
async fn test_failed_apply_keeps_entity_for_retry() {
    let (adapter, _turret, controller) = setup();
    adapter.faults().fail_nth(FailPoint::Execute, 2);
    let users = controller.get_repository("user").unwrap();
    for name in ["a", "b", "c"] {
        users.add(record(json!({ "name": name }))).unwrap();
    }

    assert!(controller.flush().await.is_err());
    assert_eq!(users.pending_persist_count(), 2);
    assert!(controller.has_pending_changes());
    assert_eq!(names(adapter.rows("users")), vec!["a"]);

    controller.flush().await.unwrap();
    assert_eq!(users.pending_persist_count(), 0);
    assert_eq!(names(adapter.rows("users")), vec!["a", "b", "c"]);
    assert_eq!(adapter.journal().executed().len(), 4);
}

#[tokio::test]
async fn test_failed_repository_blocks_later_ones() {
    let (adapter, _turret, controller) = setup();
    adapter
        .faults()
        .fail_matching(FailPoint::Execute, |p| p.statement == "persist users");
    let users = controller.get_repository("user").unwrap();
    let posts = controller.get_repository("post").unwrap();
    users.add(record(json!({"id": 1}))).unwrap();
    posts.add(record(json!({"id": 1}))).unwrap();

    assert!(controller.flush().await.is_err());
    assert!(users.is_dirty());
    assert!(posts.is_dirty());
    assert!(adapter.rows("posts").is_empty());
}

#[tokio::test]
async fn test_two_repositories_for_one_entity_both_flush() {
    let (adapter, _turret, controller) = setup();
    let first = controller.get_repository("user").unwrap();
    let second = controller.get_repository("user").unwrap();

    first.add(record(json!({"name": "a"}))).unwrap();
    second.add(record(json!({"name": "b"}))).unwrap();
    controller.flush().await.unwrap();

    assert_eq!(names(adapter.rows("users")), vec!["a", "b"]);
}

#[tokio::test]
async fn test_clones_share_queues() {
    let (adapter, _turret, controller) = setup();
    let users = controller.get_repository("user").unwrap();
    let alias = users.clone();

    alias.add(record(json!({"name": "a"}))).unwrap();
    assert_eq!(users.pending_persist_count(), 1);

    controller.flush().await.unwrap();
    assert_eq!(adapter.journal().executed().len(), 1);
}

#[tokio::test]
async fn test_apply_returns_applied_count() {
    let (adapter, _turret, controller) = setup();
    adapter.insert("users", record(json!({"id": 1})));
    let users = controller.get_repository("user").unwrap();
    users.add(record(json!({"id": 2}))).unwrap();
    users.add(record(json!({"id": 3}))).unwrap();
    users.remove(record(json!({"id": 1}))).unwrap();

    assert_eq!(users.apply_persistence().await.unwrap(), 2);
    assert_eq!(users.apply_remove().await.unwrap(), 1);
    assert_eq!(users.apply_persistence().await.unwrap(), 0);
    assert_eq!(adapter.rows("users").len(), 2);
}

#[tokio::test]
async fn test_clear_drops_staged_changes() {
    let (adapter, _turret, controller) = setup();
    let users = controller.get_repository("user").unwrap();
    users.add(record(json!({"id": 1}))).unwrap();
    users.clear();

    assert!(!users.is_dirty());
    controller.flush().await.unwrap();
    assert!(adapter.journal().executed().is_empty());
}

#[tokio::test]
async fn test_missing_table_option_keeps_entity_queued() {
    let (adapter, turret, controller) = setup();
    turret
        .configuration("main")
        .unwrap()
        .set_entity_parameter("draft", turret_data::EntityParameter::default());

    let drafts = controller.get_repository("draft").unwrap();
    drafts.add(record(json!({"id": 1}))).unwrap();
    let err = controller.flush().await.unwrap_err();

    assert_eq!(err.to_string(), "Configuration error: Missing entity option 'table'");
    assert_eq!(drafts.pending_persist_count(), 1);
    assert!(adapter.journal().events().is_empty());
}

// ── Reads ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_empty_reads() {
    let (_adapter, _turret, controller) = setup();
    let users = controller.get_repository("user").unwrap();

    assert_eq!(users.find_all().await.unwrap(), Vec::<Record>::new());
    assert_eq!(users.find(42).await.unwrap(), None);
    assert_eq!(users.find_one_by(record(json!({"name": "x"}))).await.unwrap(), None);
}

#[tokio::test]
async fn test_find_by_id() {
    let (adapter, _turret, controller) = setup();
    seed_users(&adapter);
    let users = controller.get_repository("user").unwrap();

    let row = users.find(2).await.unwrap().unwrap();
    assert_eq!(row["name"], json!("alice"));

    let select = &adapter.journal().found()[0];
    assert_eq!(select.statement, "select users");
    assert_eq!(select.binds[0], json!({"id": 2}));
    assert_eq!(select.binds[2], json!(null));
}

#[tokio::test]
async fn test_find_one_by_limits_to_one() {
    let (adapter, _turret, controller) = setup();
    seed_users(&adapter);
    let users = controller.get_repository("user").unwrap();

    let row = users
        .find_one_by(record(json!({"active": true})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["name"], json!("carol"));

    let select = &adapter.journal().found()[0];
    assert_eq!(select.binds[2], json!(1));
    assert_eq!(select.binds[3], json!(0));
}

#[tokio::test]
async fn test_find_by_orders_and_pages() {
    let (adapter, _turret, controller) = setup();
    seed_users(&adapter);
    let users = controller.get_repository("user").unwrap();

    let all = users
        .find_by(Record::new(), vec![("name".into(), Direction::Asc)], None, None)
        .await
        .unwrap();
    assert_eq!(names(all), vec!["alice", "bob", "carol"]);

    let page = users
        .find_by(
            Record::new(),
            vec![("name".into(), Direction::Desc)],
            Some(1),
            Some(1),
        )
        .await
        .unwrap();
    assert_eq!(names(page), vec!["bob"]);

    let active = users
        .find_by(record(json!({"active": true})), Vec::new(), None, None)
        .await
        .unwrap();
    assert_eq!(names(active), vec!["carol", "bob"]);
}

#[tokio::test]
async fn test_find_by_any_of() {
    let (adapter, _turret, controller) = setup();
    seed_users(&adapter);
    let users = controller.get_repository("user").unwrap();

    let rows = users
        .select(turret_data::SelectQuery::new(record(json!({"id": [1, 3]}))))
        .await
        .unwrap();
    assert_eq!(names(rows), vec!["carol", "bob"]);
}

#[tokio::test]
async fn test_reads_outside_unit_of_work_end_their_session() {
    let (adapter, _turret, controller) = setup();
    let users = controller.get_repository("user").unwrap();

    users.find_all().await.unwrap();
    users.find(1).await.unwrap();

    let journal = adapter.journal();
    assert_eq!(journal.sessions_created(), 2);
    assert_eq!(journal.ends(), 2);
    assert_eq!(journal.working_sessions(), vec![1, 2]);
}

#[tokio::test]
async fn test_find_failure_still_releases() {
    let (adapter, _turret, controller) = setup();
    adapter.faults().fail(FailPoint::Find);
    let users = controller.get_repository("user").unwrap();

    assert!(matches!(users.find_all().await, Err(DataError::Database(_))));
    assert_eq!(adapter.journal().ends(), 1);
}

// ── Entities ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_rows_go_through_entity_factory() {
    let (adapter, _turret, controller) = setup();
    adapter.insert("members", record(json!({"id": 1, "role": "admin"})));
    let members = controller.get_repository("member").unwrap();

    let member = members.find(1).await.unwrap().unwrap();
    assert_eq!(member, record(json!({"id": 1, "role": "admin", "active": true})));
}

#[test]
fn test_create_entity() {
    let (_adapter, _turret, controller) = setup();

    let raw = controller
        .create_entity("user", record(json!({"name": "a"})))
        .unwrap();
    assert_eq!(raw, record(json!({"name": "a"})));

    let member = controller
        .create_entity("member", record(json!({"name": "m"})))
        .unwrap();
    assert_eq!(
        member,
        record(json!({"name": "m", "active": true, "role": "guest"}))
    );

    assert!(controller.create_entity("ghost", Record::new()).is_err());
}

// ── Custom repositories ────────────────────────────────────────────────────

struct UserRepository {
    base: Repository,
}

impl UserRepository {
    async fn by_name(&self, name: &str) -> Result<Option<Record>, DataError> {
        self.base.find_one_by(record(json!({ "name": name }))).await
    }

    fn register(&self, name: &str) -> Result<(), DataError> {
        self.base.add(record(json!({ "name": name })))
    }
}

#[tokio::test]
async fn test_custom_repository() {
    let (adapter, turret, controller) = setup();
    turret.configuration("main").unwrap().set_entity_parameter(
        "user",
        entity("users").with_repository_factory(|base: Repository| UserRepository { base }),
    );

    let users = controller.get_custom_repository::<UserRepository>("user").unwrap();
    users.register("dave").unwrap();
    controller.flush().await.unwrap();

    assert!(users.by_name("dave").await.unwrap().is_some());
    assert_eq!(users.base.entity_name(), "user");
    assert_eq!(names(adapter.rows("users")), vec!["dave"]);
}

#[test]
fn test_custom_repository_errors() {
    let (_adapter, turret, controller) = setup();

    let err = controller.get_custom_repository::<UserRepository>("post").err().unwrap();
    assert!(matches!(err, DataError::Repository(_)));

    turret.configuration("main").unwrap().set_entity_parameter(
        "post",
        entity("posts").with_repository_factory(|base: Repository| base),
    );
    let err = controller.get_custom_repository::<UserRepository>("post").err().unwrap();
    assert!(matches!(err, DataError::Repository(_)));
    assert!(controller.get_custom_repository::<Repository>("post").is_ok());
}

#[tokio::test]
async fn test_repository_keeps_its_controller_alive() {
    let (adapter, turret, _controller) = setup();
    seed_users(&adapter);

    let users = turret
        .create_controller("main")
        .unwrap()
        .get_repository("user")
        .unwrap();
    assert_eq!(users.find_all().await.unwrap().len(), 3);

    users.add(record(json!({"id": 4, "name": "dave"}))).unwrap();
    users.controller().flush().await.unwrap();
    assert_eq!(adapter.rows("users").len(), 4);
    assert!(!users.is_dirty());
}

#[tokio::test]
async fn test_staged_changes_survive_dropped_repository() {
    let (adapter, _turret, controller) = setup();

    controller
        .get_repository("user")
        .unwrap()
        .add(record(json!({"name": "eve"})))
        .unwrap();
    assert!(controller.has_pending_changes());

    controller.flush().await.unwrap();
    assert_eq!(names(adapter.rows("users")), vec!["eve"]);
    assert!(!controller.has_pending_changes());
}
