// Integration tests for the request dispatcher
// Covers: reply shapes per action, lifecycle errors, unknown actions,
// snapshot persistence after mutations and persistence failure handling

use serde_json::json;
use sqlbridge_core::errors::{ExError, ExErrorKind, Result};
use sqlbridge_core::logging_facility::test_capture::init_test_capture;
use sqlbridge_core::protocol::{Action, ActionResult, Params, Request, Response};
use sqlbridge_core::schema::{FIELD_DATABASE, FIELD_ERR_CODE, FIELD_REQUEST_ID};
use sqlbridge_core_types::RequestId;
use sqlbridge_engine::{BundledSqlite, Dispatcher, EngineLoader, EngineModule};
use sqlbridge_store::{KvBackend, MemoryKv, SnapshotStore};
use std::sync::Arc;
use tracing::Level;

struct MissingEngine;

impl EngineLoader for MissingEngine {
    fn load(&self) -> Result<EngineModule> {
        Err(ExError::new(ExErrorKind::EngineUnavailable)
            .with_op("load_engine")
            .with_message("SQLite3 is not available"))
    }
}

fn dispatcher_on(kv: Arc<MemoryKv>) -> Dispatcher {
    Dispatcher::bootstrap(
        &BundledSqlite,
        SnapshotStore::new(kv, "keyvaluepairs"),
        "sqlite_db_data",
    )
}

async fn call(dispatcher: &Dispatcher, id: i64, action: Action, params: Params) -> Response {
    let response = dispatcher.handle(Request::new(id, action, params)).await;
    assert_eq!(response.id(), &RequestId::Number(id));
    response
}

#[tokio::test]
async fn test_init_exec_export_restore_flow() {
    // Given: A fresh context with an empty store
    let kv = Arc::new(MemoryKv::new());
    let dispatcher = dispatcher_on(kv.clone());

    // When: We init and create a table
    let init = call(&dispatcher, 1, Action::Init, Params::default()).await;
    let created = call(&dispatcher, 2, Action::Exec, Params::sql("CREATE TABLE t(x)")).await;

    // Then: Init acknowledges and the mutation was persisted
    assert_eq!(
        serde_json::to_value(&init).unwrap(),
        json!({"id": 1, "result": {"success": true}})
    );
    assert!(created.into_result().unwrap().as_rows().is_some());
    let stored = kv.peek("keyvaluepairs", "sqlite_db_data").unwrap();
    assert!(!stored.is_empty());

    // When: We export and import the blob into another context
    let blob = call(&dispatcher, 3, Action::Export, Params::default())
        .await
        .into_result()
        .unwrap()
        .into_blob()
        .unwrap();

    let other = dispatcher_on(Arc::new(MemoryKv::new()));
    call(&other, 1, Action::Init, Params::default()).await;
    let imported = call(&other, 2, Action::Import, Params::data(blob)).await;

    // Then: The table exists and is empty
    assert_eq!(imported.into_result().unwrap().as_ack().map(|a| a.success), Some(true));
    let rows = call(&other, 3, Action::Exec, Params::sql("SELECT * FROM t"))
        .await
        .into_result()
        .unwrap();
    assert_eq!(rows.as_rows().unwrap().row_count(), 0);
}

#[tokio::test]
async fn test_open_replies_true() {
    let dispatcher = dispatcher_on(Arc::new(MemoryKv::new()));

    let opened = call(&dispatcher, 1, Action::Open, Params::path("notes.db")).await;

    assert_eq!(opened.into_result().unwrap(), ActionResult::Flag(true));
}

#[tokio::test]
async fn test_exec_before_init_is_not_initialized() {
    let dispatcher = dispatcher_on(Arc::new(MemoryKv::new()));

    let err = call(&dispatcher, 1, Action::Exec, Params::sql("SELECT 1"))
        .await
        .into_result()
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::NotInitialized);
}

#[tokio::test]
async fn test_close_then_exec_and_close_again() {
    // Given: An initialized context
    let dispatcher = dispatcher_on(Arc::new(MemoryKv::new()));
    call(&dispatcher, 1, Action::Init, Params::default()).await;

    // When: We close twice and exec in between
    let first = call(&dispatcher, 2, Action::Close, Params::default()).await;
    let exec = call(&dispatcher, 3, Action::Exec, Params::sql("SELECT 1")).await;
    let second = call(&dispatcher, 4, Action::Close, Params::default()).await;

    // Then: Only the first close reports true and exec needs a new init
    assert_eq!(first.into_result().unwrap(), ActionResult::Flag(true));
    assert_eq!(exec.into_result().unwrap_err().kind(), ExErrorKind::NotInitialized);
    assert_eq!(second.into_result().unwrap(), ActionResult::Flag(false));
}

#[tokio::test]
async fn test_unknown_action_echoes_id() {
    let dispatcher = dispatcher_on(Arc::new(MemoryKv::new()));

    let response = dispatcher
        .handle(Request::from_json(r#"{"id":"v-1","action":"vacuum"}"#).unwrap())
        .await;

    assert_eq!(response.id(), &RequestId::from("v-1"));
    let err = response.into_result().unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::UnknownAction);
    assert!(err.message().contains("vacuum"));
}

#[tokio::test]
async fn test_engine_error_message_reaches_caller() {
    let dispatcher = dispatcher_on(Arc::new(MemoryKv::new()));
    call(&dispatcher, 1, Action::Init, Params::default()).await;

    let response = call(&dispatcher, 2, Action::Exec, Params::sql("SELEC 1")).await;

    let Response::Failure { error, .. } = response else {
        panic!("expected an error reply");
    };
    assert!(error.starts_with("[ERR_ENGINE_EXECUTION]"));
    assert!(error.contains("syntax error"));
}

#[tokio::test]
async fn test_dispatch_error_log_carries_error_text() {
    let capture = init_test_capture();

    // Given: An initialized context
    let dispatcher = dispatcher_on(Arc::new(MemoryKv::new()));
    dispatcher
        .handle(Request::new("log-err-1", Action::Init, Params::default()))
        .await;

    // When: A statement fails
    dispatcher
        .handle(Request::new("log-err-2", Action::Exec, Params::sql("SELEC 1")))
        .await;

    // Then: The error event names the request and includes the engine message
    let logged = capture.count_events(|e| {
        e.level == Level::ERROR
            && e.op.as_deref() == Some("dispatch")
            && e.fields.get(FIELD_REQUEST_ID).map(String::as_str) == Some("log-err-2")
            && e.fields.get(FIELD_ERR_CODE).map(String::as_str) == Some("ERR_ENGINE_EXECUTION")
            && e.message.as_deref().is_some_and(|m| m.contains("syntax error"))
    });
    assert_eq!(logged, 1);
}

#[tokio::test]
async fn test_persisted_state_survives_new_context() {
    // Given: A context that wrote a row
    let kv = Arc::new(MemoryKv::new());
    let first = dispatcher_on(kv.clone());
    call(&first, 1, Action::Init, Params::default()).await;
    call(
        &first,
        2,
        Action::Exec,
        Params::sql("CREATE TABLE t(x); INSERT INTO t VALUES (42)"),
    )
    .await;

    // When: A new context on the same store initializes
    let second = dispatcher_on(kv);
    call(&second, 1, Action::Init, Params::default()).await;
    let rows = call(&second, 2, Action::Exec, Params::sql("SELECT x FROM t"))
        .await
        .into_result()
        .unwrap();

    // Then: It observes the row
    assert_eq!(rows.as_rows().unwrap().rows, vec![vec![json!(42)]]);
}

#[tokio::test]
async fn test_persistence_failure_still_succeeds_and_warns() {
    let capture = init_test_capture();

    // Given: A store that refuses every write
    let kv = Arc::new(MemoryKv::new());
    kv.set_fail_writes(true);
    let dispatcher = dispatcher_on(kv.clone());
    call(&dispatcher, 1, Action::Init, Params::default()).await;

    // When: A mutating exec runs
    let response = call(
        &dispatcher,
        2,
        Action::Exec,
        Params::sql("CREATE TABLE lost_on_restart(x)"),
    )
    .await;

    // Then: The exec reports success and a warning was logged
    assert!(!response.is_error());
    let warnings = capture.count_events(|e| {
        e.level == Level::WARN
            && e.fields.get(FIELD_DATABASE).map(String::as_str) == Some("sqlite_db_data")
            && e
                .message
                .as_deref()
                .is_some_and(|m| m.contains("snapshot persist failed"))
    });
    assert!(warnings >= 1);

    // And: A new context does not see the table
    kv.set_fail_writes(false);
    let restarted = dispatcher_on(kv);
    call(&restarted, 1, Action::Init, Params::default()).await;
    let err = call(&restarted, 2, Action::Exec, Params::sql("SELECT * FROM lost_on_restart"))
        .await
        .into_result()
        .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::EngineExecution);
}

#[tokio::test]
async fn test_corrupt_import_keeps_live_state() {
    let dispatcher = dispatcher_on(Arc::new(MemoryKv::new()));
    call(&dispatcher, 1, Action::Init, Params::default()).await;
    call(&dispatcher, 2, Action::Exec, Params::sql("CREATE TABLE t(x)")).await;

    let err = call(&dispatcher, 3, Action::Import, Params::data(vec![1, 2, 3]))
        .await
        .into_result()
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::RestoreCorrupt);
    assert!(!call(&dispatcher, 4, Action::Exec, Params::sql("SELECT * FROM t"))
        .await
        .is_error());
}

#[tokio::test]
async fn test_corrupt_snapshot_at_init_warns_in_result() {
    let kv = Arc::new(MemoryKv::new());
    kv.put("keyvaluepairs", "sqlite_db_data", b"not an image".to_vec())
        .await
        .unwrap();
    let dispatcher = dispatcher_on(kv);

    let ack = call(&dispatcher, 1, Action::Init, Params::default())
        .await
        .into_result()
        .unwrap();

    let ack = ack.as_ack().unwrap();
    assert!(ack.success);
    assert!(ack.warning.is_some());
}

#[tokio::test]
async fn test_unavailable_engine_fails_every_action() {
    // Given: A context whose engine failed to load
    let dispatcher = Dispatcher::bootstrap(
        &MissingEngine,
        SnapshotStore::new(Arc::new(MemoryKv::new()), "keyvaluepairs"),
        "sqlite_db_data",
    );
    assert!(dispatcher.is_degraded());

    // When/Then: Every action but close fails with a message
    for (id, action) in [Action::Init, Action::Open, Action::Exec, Action::Export]
        .into_iter()
        .enumerate()
    {
        let response = call(&dispatcher, id as i64, action, Params::sql("SELECT 1")).await;
        let err = response.into_result().unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::EngineUnavailable);
        assert!(err.message().contains("SQLite3 is not available"));
    }

    let closed = call(&dispatcher, 99, Action::Close, Params::default()).await;
    assert_eq!(closed.into_result().unwrap(), ActionResult::Flag(false));
}
