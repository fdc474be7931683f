//! Execution polling integration tests.

use std::sync::Arc;
use std::time::Duration;

use athena_console::athena::{
    ExecutionId, MockQueryService, QueryService, QueryState, ServiceCall, SubmitRequest,
};
use athena_console::error::ConsoleError;
use athena_console::poller::{PollPolicy, Poller};
use tokio_util::sync::CancellationToken;
use QueryState::*;

fn poller(max_attempts: u32) -> Poller {
    Poller::new(PollPolicy::fixed(Duration::from_millis(1), max_attempts))
}

#[tokio::test]
async fn test_submitted_query_runs_to_success() {
    let mock = MockQueryService::new().with_submission_statuses(&[Queued, Running, Succeeded]);

    let id = mock
        .submit(&SubmitRequest::new("primary", "SELECT 1"))
        .await
        .unwrap();
    let execution = poller(10)
        .wait_for_completion(&mock, &id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(execution.id, id);
    assert_eq!(execution.status, Succeeded);
    assert!(execution.statistics.is_some());
    assert_eq!(mock.call_count(ServiceCall::GetExecution), 3);
}

#[tokio::test]
async fn test_failure_after_four_checks() {
    let mock =
        MockQueryService::new().with_status_sequence("e1", &[Queued, Running, Running, Failed]);

    let err = poller(100)
        .wait_for_completion(&mock, &ExecutionId::new("e1"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, ConsoleError::ExecutionFailed { status: Failed });
    assert_eq!(err.to_string(), "Query execution FAILED");
    assert_eq!(mock.call_count(ServiceCall::GetExecution), 4);
}

#[tokio::test]
async fn test_never_resolves_while_running() {
    let mock = MockQueryService::new().with_status_sequence("e1", &[Queued, Running]);

    let err = poller(25)
        .wait_for_completion(&mock, &ExecutionId::new("e1"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, ConsoleError::PollTimeout { attempts: 25 });
}

#[tokio::test]
async fn test_cancelling_one_poll_leaves_others_running() {
    let mock = Arc::new(
        MockQueryService::new()
            .with_status_sequence("slow", &[Running])
            .with_status_sequence("fast", &[Running, Running, Succeeded]),
    );
    let root = CancellationToken::new();
    let slow_token = root.child_token();
    let fast_token = root.child_token();
    let poller = Poller::new(PollPolicy::fixed(Duration::from_millis(5), 1000));

    let slow = {
        let mock = mock.clone();
        let poller = poller.clone();
        let token = slow_token.clone();
        tokio::spawn(async move {
            poller
                .wait_for_completion(mock.as_ref(), &ExecutionId::new("slow"), &token)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    slow_token.cancel();

    let fast = poller
        .wait_for_completion(mock.as_ref(), &ExecutionId::new("fast"), &fast_token)
        .await
        .unwrap();

    assert_eq!(fast.status, Succeeded);
    assert_eq!(slow.await.unwrap().unwrap_err(), ConsoleError::Cancelled);
    assert!(!root.is_cancelled());
}
