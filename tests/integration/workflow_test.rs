//! Workbench integration tests.
//!
//! Drives a running `WorkbenchActor` through its handle and observes the
//! published snapshots.

use std::sync::Arc;
use std::time::Duration;

use athena_console::athena::{
    FailingQueryService, MockQueryService, QueryExecution, QueryService, QueryState, SavedQuery,
    ServiceCall, Value, Workgroup,
};
use athena_console::error::ConsoleError;
use athena_console::poller::{PollPolicy, Poller};
use athena_console::workflow::{
    ListKind, QueryDraft, Stage, SubmitDefaults, WorkbenchActor, WorkbenchHandle,
    WorkbenchSnapshot, WorkbenchState,
};
use tokio::task::JoinHandle;
use tokio::time::timeout;

struct Harness {
    handle: WorkbenchHandle,
    actor: JoinHandle<()>,
}

impl Harness {
    fn start(mock: &Arc<MockQueryService>) -> Self {
        Self::start_with(mock, WorkbenchState::new(SubmitDefaults::default()))
    }

    fn start_with(mock: &Arc<MockQueryService>, state: WorkbenchState) -> Self {
        let service: Arc<dyn QueryService> = mock.clone();
        let poller = Poller::new(PollPolicy::fixed(Duration::from_millis(1), 200));
        let (handle, actor) = WorkbenchActor::spawn(state, service, poller);
        Self {
            handle,
            actor: tokio::spawn(actor.run()),
        }
    }

    async fn wait(&self, condition: impl FnMut(&WorkbenchSnapshot) -> bool) -> WorkbenchSnapshot {
        timeout(Duration::from_secs(2), self.handle.wait_for(condition))
            .await
            .expect("timed out waiting for workbench state")
            .unwrap()
    }

    async fn stop(self) {
        self.handle.shutdown().await.unwrap();
        self.actor.await.unwrap();
    }
}

fn executions(range: std::ops::RangeInclusive<u32>) -> Vec<QueryExecution> {
    range
        .map(|i| QueryExecution::new(format!("e{i}"), "SELECT 1", QueryState::Succeeded))
        .collect()
}

fn first_cell(snapshot: &WorkbenchSnapshot) -> Option<Value> {
    snapshot
        .results
        .ok()
        .and_then(|r| r.rows.items.first())
        .and_then(|row| row.first())
        .cloned()
}

#[tokio::test]
async fn test_workgroup_change_clears_saved_query() {
    let q1 = SavedQuery::new("q1", "Q1", "SELECT 1");
    let mock = Arc::new(
        MockQueryService::new()
            .with_workgroups(vec![Workgroup::new("A"), Workgroup::new("B")])
            .with_saved_queries("A", vec![q1.clone()])
            .with_saved_queries("B", vec![SavedQuery::new("q2", "Q2", "SELECT 2")]),
    );
    let harness = Harness::start(&mock);
    harness.wait(|s| s.saved_queries.is_ok()).await;

    harness.handle.on_query_change(Some(q1.clone())).await.unwrap();
    let snapshot = harness.wait(|s| s.draft.saved().is_some()).await;
    assert_eq!(snapshot.draft, QueryDraft::Saved(q1));

    harness
        .handle
        .on_workgroup_change(Workgroup::new("B"))
        .await
        .unwrap();
    let snapshot = harness
        .wait(|s| s.selected_workgroup == Some(Workgroup::new("B")) && s.saved_queries.is_ok())
        .await;

    assert_eq!(snapshot.draft, QueryDraft::Empty);
    assert_eq!(
        snapshot.saved_queries.ok().map(|p| p.items[0].key.clone()),
        Some("q2".to_string())
    );
    harness.stop().await;
}

#[tokio::test]
async fn test_custom_text_replaces_saved_query() {
    let mock = Arc::new(MockQueryService::new().with_workgroups(vec![Workgroup::new("A")]));
    let harness = Harness::start(&mock);

    harness
        .handle
        .on_query_change(Some(SavedQuery::new("q1", "Q1", "SELECT 1")))
        .await
        .unwrap();
    harness
        .handle
        .on_query_body_change(Some("SELECT 2".to_string()))
        .await
        .unwrap();

    let snapshot = harness
        .wait(|s| s.draft == QueryDraft::Custom("SELECT 2".to_string()))
        .await;
    assert!(snapshot.draft.saved().is_none());
    harness.stop().await;
}

#[tokio::test]
async fn test_later_submission_wins() {
    // E1 stays RUNNING long enough for E2 to be submitted before it resolves.
    let mock = Arc::new(
        MockQueryService::new()
            .with_workgroups(vec![Workgroup::new("A")])
            .with_status_sequence("exec-1", &[QueryState::Running, QueryState::Succeeded])
            .with_status_delay("exec-1", Duration::from_millis(50)),
    );
    let harness = Harness::start(&mock);
    harness.wait(|s| s.selected_workgroup.is_some()).await;

    harness
        .handle
        .on_submit(Some("SELECT 'first'".to_string()))
        .await
        .unwrap();
    harness.wait(|s| s.current_execution().is_some()).await;
    harness
        .handle
        .on_submit(Some("SELECT 'second'".to_string()))
        .await
        .unwrap();

    let snapshot = harness.wait(|s| s.results.is_ok()).await;
    assert_eq!(snapshot.current_execution().map(|id| id.as_str()), Some("exec-2"));
    assert_eq!(
        first_cell(&snapshot),
        Some(Value::String("Mock result for: SELECT 'second'".to_string()))
    );

    // Give the superseded poll time to have resolved, had it not been cancelled.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let snapshot = harness.handle.snapshot();
    assert_eq!(snapshot.current_execution().map(|id| id.as_str()), Some("exec-2"));
    assert_eq!(
        first_cell(&snapshot),
        Some(Value::String("Mock result for: SELECT 'second'".to_string()))
    );
    harness.stop().await;
}

#[tokio::test]
async fn test_submit_draft_uses_saved_query_and_defaults() {
    let mock = Arc::new(MockQueryService::new().with_workgroups(vec![Workgroup::new("A")]));
    let state = WorkbenchState::new(SubmitDefaults {
        database: Some("events".to_string()),
        output_location: None,
    });
    let harness = Harness::start_with(&mock, state);
    harness.wait(|s| s.selected_workgroup.is_some()).await;

    harness
        .handle
        .on_query_change(Some(SavedQuery::new("q1", "Q1", "SELECT 7")))
        .await
        .unwrap();
    harness.handle.on_submit(None).await.unwrap();
    harness.wait(|s| s.results.is_ok()).await;

    let submitted = mock.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].query, "SELECT 7");
    assert_eq!(submitted[0].database.as_deref(), Some("events"));
    harness.stop().await;
}

#[tokio::test]
async fn test_submission_refreshes_executions() {
    let mock = Arc::new(MockQueryService::new().with_workgroups(vec![Workgroup::new("A")]));
    let harness = Harness::start(&mock);
    harness.wait(|s| s.executions.is_ok()).await;

    harness
        .handle
        .on_submit(Some("SELECT 1".to_string()))
        .await
        .unwrap();

    let snapshot = harness
        .wait(|s| s.executions.ok().is_some_and(|p| !p.is_empty()))
        .await;
    assert_eq!(
        snapshot.executions.ok().map(|p| p.items[0].id.to_string()),
        Some("exec-1".to_string())
    );
    harness.stop().await;
}

#[tokio::test]
async fn test_load_more_executions() {
    let mock = Arc::new(
        MockQueryService::new()
            .with_workgroups(vec![Workgroup::new("default")])
            .with_execution_pages("default", vec![executions(1..=10), executions(11..=15)]),
    );
    let harness = Harness::start(&mock);

    let snapshot = harness.wait(|s| s.executions.is_ok()).await;
    assert_eq!(snapshot.executions.ok().map(|p| p.len()), Some(10));

    harness.handle.on_load_more(ListKind::Executions).await.unwrap();
    let snapshot = harness
        .wait(|s| s.executions.ok().is_some_and(|p| p.len() == 15))
        .await;
    let ids: Vec<String> = snapshot
        .executions
        .ok()
        .map(|p| p.items.iter().map(|e| e.id.to_string()).collect())
        .unwrap_or_default();
    let expected: Vec<String> = (1..=15).map(|i| format!("e{i}")).collect();
    assert_eq!(ids, expected);

    let calls = mock.call_count(ServiceCall::ListExecutions);
    harness.handle.on_load_more(ListKind::Executions).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(mock.call_count(ServiceCall::ListExecutions), calls);
    assert_eq!(harness.handle.snapshot().executions.ok().map(|p| p.len()), Some(15));
    harness.stop().await;
}

#[tokio::test]
async fn test_failure_is_localized_and_retryable() {
    let mock = Arc::new(
        MockQueryService::new()
            .with_workgroups(vec![Workgroup::new("A")])
            .with_failure(ServiceCall::ListSavedQueries, "AccessDenied: no access"),
    );
    let harness = Harness::start(&mock);

    let snapshot = harness
        .wait(|s| s.saved_queries.is_err() && s.executions.is_ok())
        .await;
    assert_eq!(
        snapshot.saved_queries.err(),
        Some(&ConsoleError::remote("AccessDenied: no access"))
    );
    assert!(snapshot.workgroups.is_ok());

    mock.recover(ServiceCall::ListSavedQueries);
    harness.handle.on_retry(Stage::SavedQueries).await.unwrap();
    harness.wait(|s| s.saved_queries.is_ok()).await;
    harness.stop().await;
}

#[tokio::test]
async fn test_failed_execution_keeps_lists() {
    let mock = Arc::new(
        MockQueryService::new()
            .with_workgroups(vec![Workgroup::new("A")])
            .with_submission_statuses(&[QueryState::Queued, QueryState::Cancelled]),
    );
    let harness = Harness::start(&mock);
    harness.wait(|s| s.executions.is_ok()).await;

    harness
        .handle
        .on_submit(Some("SELECT 1".to_string()))
        .await
        .unwrap();
    let snapshot = harness.wait(|s| s.execution.is_err()).await;

    assert_eq!(
        snapshot.execution.err(),
        Some(&ConsoleError::execution_failed(QueryState::Cancelled))
    );
    assert!(snapshot.results.is_init());
    assert!(snapshot.workgroups.is_ok());
    assert_eq!(mock.call_count(ServiceCall::GetResults), 0);
    harness.stop().await;
}

#[tokio::test]
async fn test_submission_without_execution_id_is_not_polled() {
    let mock = Arc::new(
        MockQueryService::new()
            .with_workgroups(vec![Workgroup::new("A")])
            .without_execution_ids(),
    );
    let harness = Harness::start(&mock);
    harness.wait(|s| s.executions.is_ok()).await;

    harness
        .handle
        .on_submit(Some("SELECT 1".to_string()))
        .await
        .unwrap();
    let snapshot = harness.wait(|s| s.submission.is_err()).await;

    assert_eq!(snapshot.submission.err(), Some(&ConsoleError::NoExecutionId));
    assert!(snapshot.execution.is_init());
    assert_eq!(mock.call_count(ServiceCall::GetExecution), 0);
    harness.stop().await;
}

#[tokio::test]
async fn test_empty_submission_is_ignored() {
    let mock = Arc::new(MockQueryService::new().with_workgroups(vec![Workgroup::new("A")]));
    let harness = Harness::start(&mock);
    harness.wait(|s| s.selected_workgroup.is_some()).await;

    harness.handle.on_submit(Some("  ".to_string())).await.unwrap();
    harness.handle.on_submit(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(mock.call_count(ServiceCall::Submit), 0);
    assert!(harness.handle.snapshot().submission.is_init());
    harness.stop().await;
}

#[tokio::test]
async fn test_dropping_handles_stops_actor() {
    let mock = Arc::new(MockQueryService::new().with_workgroups(vec![Workgroup::new("A")]));
    let Harness { handle, actor } = Harness::start(&mock);

    drop(handle);
    timeout(Duration::from_secs(1), actor)
        .await
        .expect("actor did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_unreachable_service_fails_workgroups_only() {
    let service: Arc<dyn QueryService> = Arc::new(FailingQueryService::new("endpoint unreachable"));
    let poller = Poller::new(PollPolicy::fixed(Duration::from_millis(1), 10));
    let (handle, actor) =
        WorkbenchActor::spawn(WorkbenchState::new(SubmitDefaults::default()), service, poller);
    let actor = tokio::spawn(actor.run());

    let snapshot = timeout(Duration::from_secs(2), handle.wait_for(|s| s.workgroups.is_err()))
        .await
        .expect("timed out waiting for workgroups")
        .unwrap();
    assert_eq!(
        snapshot.workgroups.err(),
        Some(&ConsoleError::remote("endpoint unreachable"))
    );
    assert!(snapshot.selected_workgroup.is_none());
    assert!(snapshot.saved_queries.is_init());
    assert!(snapshot.executions.is_init());

    handle.shutdown().await.unwrap();
    actor.await.unwrap();
}
