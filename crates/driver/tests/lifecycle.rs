//! Result-set lifecycle: execute, failure surfacing, cancellation,
//! interruption, and session validity.

mod common;

use common::{make_session, FakeRemote, QueryScript};
use noctua_common::warnings::with_warning_scope;
use noctua_driver::{QueryState, ResultSet};
use noctua_error::ErrorCode;

#[tokio::test(start_paused = true)]
async fn test_execute_blocks_until_success() {
    let remote = FakeRemote::new();
    remote.stage(
        "select * from t",
        QueryScript {
            polls_before_terminal: 3,
            ..QueryScript::default()
        },
    );
    let session = make_session(&remote, 0);

    let rs = ResultSet::execute(session, "select * from t").await.unwrap();

    assert_eq!(rs.last_status().unwrap().state, QueryState::Succeeded);
    assert_eq!(rs.execution_id(), Some("exec-0000"));

    let stats = rs.statistics().unwrap();
    assert_eq!(stats.bytes_scanned, Some(1024));
    assert_eq!(stats.execution_time_ms, Some(2500));
}

#[tokio::test(start_paused = true)]
async fn test_failed_query_surfaces_remote_reason() {
    let remote = FakeRemote::new();
    remote.stage("select broken", QueryScript::failing("SYNTAX_ERROR at line 1"));
    let session = make_session(&remote, 4);

    let err = ResultSet::execute(session.clone(), "select broken")
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::QueryFailed);
    assert!(err.message.contains("SYNTAX_ERROR at line 1"));
    let context = err.context.expect("failure carries context");
    assert_eq!(context.execution_id.as_deref(), Some("exec-0000"));
    assert_eq!(context.query_state.as_deref(), Some("FAILED"));

    // A failed query must never be cached: re-sending submits again.
    let _ = ResultSet::execute(session, "select broken").await.unwrap_err();
    assert_eq!(remote.submit_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_query_is_nonfatal_empty_result() {
    let remote = FakeRemote::new();
    remote.stage("select slow", QueryScript::cancelled());
    let session = make_session(&remote, 0);

    let mut rs = ResultSet::execute(session, "select slow").await.unwrap();
    assert_eq!(rs.last_status().unwrap().state, QueryState::Cancelled);

    let frame = rs.fetch(-1).await.unwrap();
    assert_eq!(frame.num_rows(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_cancels_remote_and_stays_usable() {
    let remote = FakeRemote::new();
    remote.stage(
        "select eternal",
        QueryScript {
            polls_before_terminal: 50,
            ..QueryScript::default()
        },
    );
    let session = make_session(&remote, 0);

    let mut rs = ResultSet::send(session.clone(), "select eternal")
        .await
        .unwrap();
    session.interrupt();

    let err = rs.poll().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::QueryInterrupted);
    // Partial status is surfaced in the error, not swallowed.
    let context = err.context.expect("interrupt carries context");
    assert!(context.query_state.is_some());

    // Best-effort cancel reached the remote service.
    assert_eq!(remote.cancel_count(), 1);

    // The result set is not corrupted: still valid and re-pollable.
    assert!(rs.is_valid());
    let status = rs.poll().await.unwrap();
    assert_eq!(status.state, QueryState::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_survives_cancel_rejection() {
    let remote = FakeRemote::new();
    remote.stage(
        "select stubborn",
        QueryScript {
            polls_before_terminal: 3,
            reject_cancel: true,
            ..QueryScript::default()
        },
    );
    let session = make_session(&remote, 0);

    let mut rs = ResultSet::send(session.clone(), "select stubborn")
        .await
        .unwrap();
    session.interrupt();

    let (result, warnings) = with_warning_scope(rs.poll()).await;
    let err = result.unwrap_err();
    assert_eq!(err.code, ErrorCode::QueryInterrupted);
    assert!(warnings.iter().any(|w| w.contains("Failed to cancel")));

    // Cancellation failed, so the query keeps running; a later poll
    // still reaches the scripted terminal state.
    let status = rs.poll().await.unwrap();
    assert_eq!(status.state, QueryState::Succeeded);
}

#[tokio::test(start_paused = true)]
async fn test_transient_remote_errors_are_retried() {
    let remote = FakeRemote::new();
    remote.stage(
        "select flaky",
        QueryScript {
            submit_failures: 2,
            status_failures: 2,
            ..QueryScript::default()
        },
    );
    let session = make_session(&remote, 0);

    let rs = ResultSet::execute(session, "select flaky").await.unwrap();
    assert_eq!(rs.last_status().unwrap().state, QueryState::Succeeded);
    // Only one submission actually went through.
    assert_eq!(remote.submit_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_closed_session_rejects_operations_locally() {
    let remote = FakeRemote::new();
    let session = make_session(&remote, 0);

    session.close();
    assert!(!session.is_valid());

    let err = ResultSet::send(session.clone(), "select 1")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::SessionClosed);
    // No remote call was made.
    assert_eq!(remote.submit_count(), 0);

    // Double close warns instead of erroring.
    let ((), warnings) = with_warning_scope(async {
        session.close();
    })
    .await;
    assert!(warnings.iter().any(|w| w.contains("already closed")));
}

#[tokio::test(start_paused = true)]
async fn test_catalog_passthroughs() {
    let remote = FakeRemote::new();
    remote.stage_table(
        "sales",
        noctua_driver::TableInfo {
            database: "sales".to_string(),
            name: "orders".to_string(),
            columns: Vec::new(),
        },
    );
    let session = make_session(&remote, 0);

    let databases = session.list_databases().await.unwrap();
    assert!(databases.contains(&"sales".to_string()));
    assert_eq!(session.list_tables("sales").await.unwrap(), vec!["orders"]);
    assert!(session.table_exists("sales", "orders").await.unwrap());
    assert!(!session.table_exists("sales", "refunds").await.unwrap());

    session.delete_table("sales", "orders").await.unwrap();
    assert!(!session.table_exists("sales", "orders").await.unwrap());
}
