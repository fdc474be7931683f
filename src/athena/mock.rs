//! In-memory query services for testing.
//!
//! [`MockQueryService`] serves scripted data: status sequences per execution,
//! paged listings and paged results. [`FailingQueryService`] fails every call.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{
    ColumnInfo, ExecutionId, ExecutionStatistics, QueryExecution, QueryService, QueryState,
    RawResultPage, RawRow, SavedQuery, SubmitRequest, Workgroup,
};
use crate::error::{ConsoleError, Result};
use crate::paging::Page;

/// Operations of [`QueryService`], for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceCall {
    Submit,
    GetExecution,
    GetResults,
    ListWorkgroups,
    ListSavedQueries,
    ListExecutions,
}

/// Status sequence of one execution. The last state repeats once reached.
#[derive(Debug, Clone)]
struct StatusScript {
    states: Vec<QueryState>,
    cursor: usize,
}

impl StatusScript {
    fn new(states: &[QueryState]) -> Self {
        Self {
            states: states.to_vec(),
            cursor: 0,
        }
    }

    fn advance(&mut self) -> QueryState {
        let idx = self.cursor.min(self.states.len().saturating_sub(1));
        self.cursor += 1;
        self.states.get(idx).copied().unwrap_or(QueryState::Running)
    }
}

#[derive(Debug, Clone)]
struct ScriptedResults {
    columns: Vec<ColumnInfo>,
    pages: Vec<Vec<RawRow>>,
}

#[derive(Debug, Default)]
struct MockState {
    workgroups: Vec<Vec<Workgroup>>,
    saved_queries: HashMap<String, Vec<Vec<SavedQuery>>>,
    executions: HashMap<String, Vec<Vec<QueryExecution>>>,
    statuses: HashMap<String, StatusScript>,
    status_delays: HashMap<String, Duration>,
    results: HashMap<String, ScriptedResults>,
    queries: HashMap<String, String>,
    submission_statuses: Vec<QueryState>,
    submitted: Vec<SubmitRequest>,
    next_id: u64,
    omit_execution_id: bool,
    failures: HashMap<ServiceCall, String>,
    calls: HashMap<ServiceCall, usize>,
}

/// A scriptable in-memory query service.
///
/// Listings are configured as explicit pages; the continuation token of
/// page `n` is the string `n + 1`. Submitted queries get ids `exec-1`,
/// `exec-2`, ... and walk through the configured submission statuses
/// (RUNNING then SUCCEEDED by default). Their results echo the query text
/// unless results were scripted for that id.
#[derive(Debug)]
pub struct MockQueryService {
    state: Mutex<MockState>,
}

impl MockQueryService {
    /// Creates an empty mock service.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                submission_statuses: vec![QueryState::Running, QueryState::Succeeded],
                ..MockState::default()
            }),
        }
    }

    /// Creates a mock service populated with a small sample catalog.
    pub fn demo() -> Self {
        let columns = vec![
            ColumnInfo::new("event_type", "varchar"),
            ColumnInfo::new("events", "bigint"),
        ];
        let header: RawRow = vec![Some("event_type".to_string()), Some("events".to_string())];

        let mut finished = QueryExecution::new(
            "demo-0001",
            "SELECT event_type, count(*) AS events FROM events GROUP BY 1",
            QueryState::Succeeded,
        )
        .with_workgroup("primary");
        finished.statistics = Some(ExecutionStatistics {
            engine_execution_time_ms: Some(1830),
            data_scanned_bytes: Some(48 * 1024 * 1024),
        });
        let failed =
            QueryExecution::new("demo-0002", "SELECT * FROM missing_table", QueryState::Failed)
                .with_workgroup("primary");

        let mut daily = SavedQuery::new(
            "sq-1",
            "Events by type",
            "SELECT event_type, count(*) AS events FROM events GROUP BY 1",
        );
        daily.description = Some("Event counts per type".to_string());

        Self::new()
            .with_workgroups(vec![Workgroup::new("primary"), Workgroup::new("analytics")])
            .with_saved_queries(
                "primary",
                vec![
                    daily,
                    SavedQuery::new("sq-2", "Latest events", "SELECT * FROM events LIMIT 10"),
                ],
            )
            .with_saved_queries(
                "analytics",
                vec![SavedQuery::new("sq-3", "Sessions", "SELECT count(*) FROM sessions")],
            )
            .with_execution_pages("primary", vec![vec![finished, failed]])
            .with_results(
                "demo-0001",
                columns,
                vec![vec![
                    header,
                    vec![Some("click".to_string()), Some("1204".to_string())],
                    vec![Some("view".to_string()), Some("5321".to_string())],
                ]],
            )
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sets the workgroup listing as a single page.
    pub fn with_workgroups(self, workgroups: Vec<Workgroup>) -> Self {
        self.with_workgroup_pages(vec![workgroups])
    }

    /// Sets the workgroup listing as explicit pages.
    pub fn with_workgroup_pages(self, pages: Vec<Vec<Workgroup>>) -> Self {
        self.lock().workgroups = pages;
        self
    }

    /// Sets the saved queries of `workgroup` as a single page.
    pub fn with_saved_queries(self, workgroup: &str, queries: Vec<SavedQuery>) -> Self {
        self.lock()
            .saved_queries
            .insert(workgroup.to_string(), vec![queries]);
        self
    }

    /// Sets the execution listing of `workgroup` as explicit pages.
    pub fn with_execution_pages(self, workgroup: &str, pages: Vec<Vec<QueryExecution>>) -> Self {
        {
            let mut state = self.lock();
            for execution in pages.iter().flatten() {
                state
                    .queries
                    .insert(execution.id.to_string(), execution.query.clone());
            }
            state.executions.insert(workgroup.to_string(), pages);
        }
        self
    }

    /// Scripts the states reported for execution `id`, one per status check.
    pub fn with_status_sequence(self, id: &str, states: &[QueryState]) -> Self {
        self.lock()
            .statuses
            .insert(id.to_string(), StatusScript::new(states));
        self
    }

    /// Delays every status check of execution `id`.
    pub fn with_status_delay(self, id: &str, delay: Duration) -> Self {
        self.lock().status_delays.insert(id.to_string(), delay);
        self
    }

    /// Sets the states walked through by executions created via `submit`.
    pub fn with_submission_statuses(self, states: &[QueryState]) -> Self {
        self.lock().submission_statuses = states.to_vec();
        self
    }

    /// Scripts the result pages of execution `id`.
    pub fn with_results(self, id: &str, columns: Vec<ColumnInfo>, pages: Vec<Vec<RawRow>>) -> Self {
        self.lock()
            .results
            .insert(id.to_string(), ScriptedResults { columns, pages });
        self
    }

    /// Makes every call of `call` fail with `message`.
    pub fn with_failure(self, call: ServiceCall, message: impl Into<String>) -> Self {
        self.fail(call, message);
        self
    }

    /// Makes every call of `call` fail with `message` from now on.
    pub fn fail(&self, call: ServiceCall, message: impl Into<String>) {
        self.lock().failures.insert(call, message.into());
    }

    /// Removes an injected failure.
    pub fn recover(&self, call: ServiceCall) {
        self.lock().failures.remove(&call);
    }

    /// Makes `submit` succeed without returning an execution id.
    pub fn without_execution_ids(self) -> Self {
        self.lock().omit_execution_id = true;
        self
    }

    /// Returns how often `call` was issued.
    pub fn call_count(&self, call: ServiceCall) -> usize {
        self.lock().calls.get(&call).copied().unwrap_or(0)
    }

    /// Returns every submission received so far.
    pub fn submitted(&self) -> Vec<SubmitRequest> {
        self.lock().submitted.clone()
    }

    /// Counts the call and returns the injected failure, if any.
    fn record(&self, call: ServiceCall) -> Result<()> {
        let mut state = self.lock();
        *state.calls.entry(call).or_insert(0) += 1;
        match state.failures.get(&call) {
            Some(message) => Err(ConsoleError::remote(message.clone())),
            None => Ok(()),
        }
    }

    fn page_of<T: Clone>(pages: Option<&Vec<Vec<T>>>, token: Option<&str>) -> Result<Page<T>> {
        let Some(pages) = pages else {
            return Ok(Page::empty());
        };
        let idx = match token {
            None => 0,
            Some(t) => t
                .parse::<usize>()
                .map_err(|_| ConsoleError::remote(format!("Invalid continuation token: {t}")))?,
        };
        let items = pages.get(idx).cloned().unwrap_or_default();
        let next = (idx + 1 < pages.len()).then(|| (idx + 1).to_string());
        Ok(Page::new(items, next))
    }
}

impl Default for MockQueryService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryService for MockQueryService {
    async fn submit(&self, request: &SubmitRequest) -> Result<ExecutionId> {
        self.record(ServiceCall::Submit)?;

        let mut state = self.lock();
        state.submitted.push(request.clone());
        if state.omit_execution_id {
            return Err(ConsoleError::NoExecutionId);
        }

        state.next_id += 1;
        let id = format!("exec-{}", state.next_id);
        let script = StatusScript::new(&state.submission_statuses);
        state.statuses.entry(id.clone()).or_insert(script);
        state.queries.insert(id.clone(), request.query.clone());
        if !state.results.contains_key(&id) {
            state.results.insert(
                id.clone(),
                ScriptedResults {
                    columns: vec![ColumnInfo::new("result", "varchar")],
                    pages: vec![vec![
                        vec![Some("result".to_string())],
                        vec![Some(format!("Mock result for: {}", request.query))],
                    ]],
                },
            );
        }

        let execution = QueryExecution::new(id.clone(), request.query.clone(), QueryState::Queued)
            .with_workgroup(request.workgroup.clone());
        let pages = state
            .executions
            .entry(request.workgroup.clone())
            .or_insert_with(|| vec![Vec::new()]);
        if let Some(first) = pages.first_mut() {
            first.insert(0, execution);
        }

        Ok(ExecutionId::new(id))
    }

    async fn get_execution(&self, id: &ExecutionId) -> Result<QueryExecution> {
        self.record(ServiceCall::GetExecution)?;

        let delay = self.lock().status_delays.get(id.as_str()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        let query = state.queries.get(id.as_str()).cloned().unwrap_or_default();

        if let Some(script) = state.statuses.get_mut(id.as_str()) {
            let status = script.advance();
            let mut execution = QueryExecution::new(id.as_str(), query, status);
            if status == QueryState::Succeeded {
                execution.statistics = Some(ExecutionStatistics {
                    engine_execution_time_ms: Some(120),
                    data_scanned_bytes: Some(0),
                });
            }
            return Ok(execution);
        }

        state
            .executions
            .values()
            .flatten()
            .flatten()
            .find(|e| &e.id == id)
            .cloned()
            .ok_or_else(|| ConsoleError::remote(format!("Query execution {id} was not found")))
    }

    async fn get_results(&self, id: &ExecutionId, token: Option<&str>) -> Result<RawResultPage> {
        self.record(ServiceCall::GetResults)?;

        let state = self.lock();
        let scripted = state
            .results
            .get(id.as_str())
            .ok_or_else(|| ConsoleError::remote(format!("Query execution {id} has no results")))?;
        let page = Self::page_of(Some(&scripted.pages), token)?;
        Ok(RawResultPage {
            columns: scripted.columns.clone(),
            rows: page.items,
            next_token: page.next_token,
        })
    }

    async fn list_workgroups(&self, token: Option<&str>) -> Result<Page<Workgroup>> {
        self.record(ServiceCall::ListWorkgroups)?;
        Self::page_of(Some(&self.lock().workgroups), token)
    }

    async fn list_saved_queries(
        &self,
        workgroup: &str,
        token: Option<&str>,
    ) -> Result<Page<SavedQuery>> {
        self.record(ServiceCall::ListSavedQueries)?;
        Self::page_of(self.lock().saved_queries.get(workgroup), token)
    }

    async fn list_executions(
        &self,
        workgroup: &str,
        token: Option<&str>,
    ) -> Result<Page<QueryExecution>> {
        self.record(ServiceCall::ListExecutions)?;
        Self::page_of(self.lock().executions.get(workgroup), token)
    }
}

/// A query service whose every call fails with the same message.
#[derive(Debug, Clone)]
pub struct FailingQueryService {
    message: String,
}

impl FailingQueryService {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn fail<T>(&self) -> Result<T> {
        Err(ConsoleError::remote(self.message.clone()))
    }
}

#[async_trait]
impl QueryService for FailingQueryService {
    async fn submit(&self, _request: &SubmitRequest) -> Result<ExecutionId> {
        self.fail()
    }

    async fn get_execution(&self, _id: &ExecutionId) -> Result<QueryExecution> {
        self.fail()
    }

    async fn get_results(&self, _id: &ExecutionId, _token: Option<&str>) -> Result<RawResultPage> {
        self.fail()
    }

    async fn list_workgroups(&self, _token: Option<&str>) -> Result<Page<Workgroup>> {
        self.fail()
    }

    async fn list_saved_queries(
        &self,
        _workgroup: &str,
        _token: Option<&str>,
    ) -> Result<Page<SavedQuery>> {
        self.fail()
    }

    async fn list_executions(
        &self,
        _workgroup: &str,
        _token: Option<&str>,
    ) -> Result<Page<QueryExecution>> {
        self.fail()
    }
}
