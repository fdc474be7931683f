//! Pagination integration tests.
//!
//! Tests continuation-token paging over the mock service listings and results.

use std::sync::Arc;

use athena_console::athena::{
    ColumnInfo, ExecutionId, MockQueryService, QueryExecution, QueryService, QueryState,
    ServiceCall, Value,
};
use athena_console::paging::{self, ExecutionSource, ResultSource, DEFAULT_MAX_PAGES};

fn executions(range: std::ops::RangeInclusive<u32>) -> Vec<QueryExecution> {
    range
        .map(|i| QueryExecution::new(format!("e{i}"), "SELECT 1", QueryState::Succeeded))
        .collect()
}

fn ids(page: &paging::Page<QueryExecution>) -> Vec<String> {
    page.items.iter().map(|e| e.id.to_string()).collect()
}

#[tokio::test]
async fn test_load_more_appends_next_page() {
    let mock = Arc::new(
        MockQueryService::new()
            .with_execution_pages("default", vec![executions(1..=10), executions(11..=15)]),
    );
    let service: Arc<dyn QueryService> = mock.clone();
    let source = ExecutionSource::new(service, "default");

    let first = paging::fetch(&source).await.unwrap();
    assert_eq!(first.len(), 10);
    assert!(first.has_more());

    let all = paging::load_more(&source, &first).await.unwrap();
    let expected: Vec<String> = (1..=15).map(|i| format!("e{i}")).collect();
    assert_eq!(ids(&all), expected);
    assert!(!all.has_more());

    let again = paging::load_more(&source, &all).await.unwrap();
    assert_eq!(again, all);
    assert_eq!(mock.call_count(ServiceCall::ListExecutions), 2);
}

#[test]
fn test_fetch_all_follows_tokens() {
    let mock = Arc::new(MockQueryService::new().with_execution_pages(
        "default",
        vec![executions(1..=2), executions(3..=4), executions(5..=5)],
    ));
    let service: Arc<dyn QueryService> = mock.clone();
    let source = ExecutionSource::new(service, "default");

    let all = tokio_test::block_on(paging::fetch_all(&source, DEFAULT_MAX_PAGES)).unwrap();

    assert_eq!(all.len(), 5);
    assert!(!all.has_more());
    assert_eq!(mock.call_count(ServiceCall::ListExecutions), 3);
}

#[tokio::test]
async fn test_fetch_all_stops_at_page_limit() {
    let mock = Arc::new(MockQueryService::new().with_execution_pages(
        "default",
        vec![executions(1..=1), executions(2..=2), executions(3..=3)],
    ));
    let service: Arc<dyn QueryService> = mock.clone();
    let source = ExecutionSource::new(service, "default");

    let page = paging::fetch_all(&source, 2).await.unwrap();

    assert_eq!(ids(&page), vec!["e1", "e2"]);
    assert!(page.has_more());
}

#[tokio::test]
async fn test_results_skip_header_and_keep_columns() {
    let columns = vec![
        ColumnInfo::new("name", "varchar"),
        ColumnInfo::new("total", "bigint"),
    ];
    let row = |name: &str, total: &str| vec![Some(name.to_string()), Some(total.to_string())];
    let mock = Arc::new(MockQueryService::new().with_results(
        "r1",
        columns.clone(),
        vec![
            vec![row("name", "total"), row("a", "1")],
            vec![row("b", "2")],
        ],
    ));
    let service: Arc<dyn QueryService> = mock.clone();
    let source = ResultSource::new(service, ExecutionId::new("r1"));

    let first = source.first().await.unwrap();
    assert_eq!(first.columns, columns);
    assert_eq!(
        first.rows.items,
        vec![vec![Value::String("a".to_string()), Value::Int(1)]]
    );

    let all = source.load_more(&first).await.unwrap();
    assert_eq!(all.row_count(), 2);
    assert_eq!(
        all.column_values("total"),
        Some(vec![&Value::Int(1), &Value::Int(2)])
    );
}

#[tokio::test]
async fn test_failed_page_propagates_error() {
    let mock = Arc::new(
        MockQueryService::new()
            .with_execution_pages("default", vec![executions(1..=1), executions(2..=2)]),
    );
    let service: Arc<dyn QueryService> = mock.clone();
    let source = ExecutionSource::new(service, "default");

    let first = paging::fetch(&source).await.unwrap();
    mock.fail(ServiceCall::ListExecutions, "throttled");

    let err = paging::load_more(&source, &first).await.unwrap_err();
    assert_eq!(err.category(), "Remote Service Error");
}
