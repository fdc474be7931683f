//! Workbench state management.
//!
//! Pure state layer for the query workbench, separated from the async actor
//! loop so the transition logic can be unit tested without a runtime.
//!
//! Every request the state asks for carries a [`Ticket`]. Each slice of state
//! remembers the ticket it is waiting for and ignores completions carrying any
//! other, so a superseded request can never overwrite newer state.

use tracing::{debug, info, warn};

use crate::async_result::AsyncResult;
use crate::athena::{
    ExecutionId, QueryExecution, QueryResults, SavedQuery, SubmitRequest, Workgroup,
};
use crate::error::Result;
use crate::paging::Page;

/// Identifies one issued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

impl std::fmt::Display for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Independently loaded regions of the workbench.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Workgroups,
    SavedQueries,
    Executions,
    Submission,
    Execution,
    Results,
}

/// Lists that support loading further pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    Workgroups,
    SavedQueries,
    Executions,
    Results,
}

impl ListKind {
    pub fn stage(self) -> Stage {
        match self {
            Self::Workgroups => Stage::Workgroups,
            Self::SavedQueries => Stage::SavedQueries,
            Self::Executions => Stage::Executions,
            Self::Results => Stage::Results,
        }
    }
}

/// The query text being edited: a saved query or free text, never both.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum QueryDraft {
    #[default]
    Empty,
    Saved(SavedQuery),
    Custom(String),
}

impl QueryDraft {
    /// Returns the text that would be submitted.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Empty => None,
            Self::Saved(query) => Some(query.body.as_str()),
            Self::Custom(text) => Some(text.as_str()),
        }
    }

    pub fn saved(&self) -> Option<&SavedQuery> {
        match self {
            Self::Saved(query) => Some(query),
            Self::Empty | Self::Custom(_) => None,
        }
    }
}

/// Work the state needs done, without its ticket.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Fetch workgroups; with `previous`, append the page after it.
    Workgroups { previous: Option<Page<Workgroup>> },
    SavedQueries {
        workgroup: String,
        previous: Option<Page<SavedQuery>>,
    },
    Executions {
        workgroup: String,
        previous: Option<Page<QueryExecution>>,
    },
    Submit(SubmitRequest),
    /// Wait for the execution to reach a terminal state.
    Poll(ExecutionId),
    Results {
        execution_id: ExecutionId,
        previous: Option<QueryResults>,
    },
}

impl Request {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Workgroups { .. } => Stage::Workgroups,
            Self::SavedQueries { .. } => Stage::SavedQueries,
            Self::Executions { .. } => Stage::Executions,
            Self::Submit(_) => Stage::Submission,
            Self::Poll(_) => Stage::Execution,
            Self::Results { .. } => Stage::Results,
        }
    }
}

/// A ticketed request for the actor to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    pub ticket: Ticket,
    pub request: Request,
}

/// Outcome of a request.
#[derive(Debug, Clone)]
pub enum Response {
    Workgroups(Result<Page<Workgroup>>),
    SavedQueries(Result<Page<SavedQuery>>),
    Executions(Result<Page<QueryExecution>>),
    Submitted(Result<ExecutionId>),
    Finished(Result<QueryExecution>),
    Results(Result<QueryResults>),
}

impl Response {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Workgroups(_) => Stage::Workgroups,
            Self::SavedQueries(_) => Stage::SavedQueries,
            Self::Executions(_) => Stage::Executions,
            Self::Submitted(_) => Stage::Submission,
            Self::Finished(_) => Stage::Execution,
            Self::Results(_) => Stage::Results,
        }
    }
}

/// A response tagged with the ticket of its request.
#[derive(Debug, Clone)]
pub struct Completion {
    pub ticket: Ticket,
    pub response: Response,
}

/// One independently loaded region.
#[derive(Debug, Clone)]
struct Slice<T> {
    value: AsyncResult<T>,
    waiting: Option<Ticket>,
    last_request: Option<Request>,
}

impl<T> Default for Slice<T> {
    fn default() -> Self {
        Self {
            value: AsyncResult::Init,
            waiting: None,
            last_request: None,
        }
    }
}

impl<T> Slice<T> {
    /// Forgets the value and any outstanding request.
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn accepts(&self, ticket: Ticket) -> bool {
        self.waiting == Some(ticket)
    }

    fn resolve(&mut self, result: Result<T>) {
        self.waiting = None;
        self.value = result.into();
    }
}

/// Everything a view renders, copied out of the state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkbenchSnapshot {
    pub workgroups: AsyncResult<Page<Workgroup>>,
    pub selected_workgroup: Option<Workgroup>,
    pub saved_queries: AsyncResult<Page<SavedQuery>>,
    pub draft: QueryDraft,
    pub executions: AsyncResult<Page<QueryExecution>>,
    pub submission: AsyncResult<ExecutionId>,
    pub execution: AsyncResult<QueryExecution>,
    pub results: AsyncResult<QueryResults>,
    /// Lists showing loaded items while a newer request for them is in flight.
    pub refreshing: Vec<ListKind>,
}

impl WorkbenchSnapshot {
    /// Id of the execution whose progress and results are displayed.
    pub fn current_execution(&self) -> Option<&ExecutionId> {
        self.submission.ok()
    }
}

/// Settings applied to every submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitDefaults {
    pub database: Option<String>,
    pub output_location: Option<String>,
}

/// State of one workbench view.
///
/// Dependency edges: the selected workgroup scopes the saved-query and
/// execution lists; the current execution id scopes the execution status and
/// the result page.
#[derive(Debug, Default)]
pub struct WorkbenchState {
    workgroups: Slice<Page<Workgroup>>,
    selected_workgroup: Option<Workgroup>,
    saved_queries: Slice<Page<SavedQuery>>,
    draft: QueryDraft,
    executions: Slice<Page<QueryExecution>>,
    submission: Slice<ExecutionId>,
    execution: Slice<QueryExecution>,
    results: Slice<QueryResults>,
    defaults: SubmitDefaults,
    preferred_workgroup: Option<String>,
    next_ticket: u64,
}

impl WorkbenchState {
    /// Creates an empty state.
    pub fn new(defaults: SubmitDefaults) -> Self {
        Self {
            defaults,
            ..Self::default()
        }
    }

    /// Selects `workgroup` on start instead of the first listed one.
    pub fn with_preferred_workgroup(mut self, workgroup: Option<String>) -> Self {
        self.preferred_workgroup = workgroup;
        self
    }

    fn ticket(&mut self) -> Ticket {
        self.next_ticket += 1;
        Ticket(self.next_ticket)
    }

    /// Issues `request` for its stage, superseding any outstanding request of that stage.
    fn issue(&mut self, request: Request, keep_value: bool) -> Effect {
        let ticket = self.ticket();
        let stage = request.stage();
        debug!("Issuing {:?} request {}", stage, ticket);

        macro_rules! arm {
            ($slice:expr) => {{
                let slice = &mut $slice;
                slice.waiting = Some(ticket);
                slice.last_request = Some(request.clone());
                if !keep_value {
                    slice.value = AsyncResult::Pending;
                }
            }};
        }

        match stage {
            Stage::Workgroups => arm!(self.workgroups),
            Stage::SavedQueries => arm!(self.saved_queries),
            Stage::Executions => arm!(self.executions),
            Stage::Submission => arm!(self.submission),
            Stage::Execution => arm!(self.execution),
            Stage::Results => arm!(self.results),
        }

        Effect { ticket, request }
    }

    /// Initial requests for a fresh view.
    pub fn start(&mut self) -> Vec<Effect> {
        let mut effects = vec![self.issue(Request::Workgroups { previous: None }, false)];
        if let Some(name) = self.preferred_workgroup.clone() {
            effects.extend(self.select_workgroup(Workgroup::new(name)));
        }
        effects
    }

    /// Selects a workgroup and reloads the lists scoped to it.
    ///
    /// Clears the selected saved query. Custom query text is kept.
    pub fn select_workgroup(&mut self, workgroup: Workgroup) -> Vec<Effect> {
        if self.selected_workgroup.as_ref() == Some(&workgroup) {
            return Vec::new();
        }

        info!("Selected workgroup {}", workgroup.name);
        if matches!(self.draft, QueryDraft::Saved(_)) {
            self.draft = QueryDraft::Empty;
        }
        self.saved_queries.reset();
        self.executions.reset();

        let name = workgroup.name.clone();
        self.selected_workgroup = Some(workgroup);

        vec![
            self.issue(
                Request::SavedQueries {
                    workgroup: name.clone(),
                    previous: None,
                },
                false,
            ),
            self.issue(
                Request::Executions {
                    workgroup: name,
                    previous: None,
                },
                false,
            ),
        ]
    }

    /// Selects a saved query, replacing any custom text.
    pub fn select_saved_query(&mut self, query: Option<SavedQuery>) {
        self.draft = match query {
            Some(query) => QueryDraft::Saved(query),
            None => QueryDraft::Empty,
        };
    }

    /// Sets custom query text, replacing any selected saved query.
    pub fn set_query_body(&mut self, body: Option<String>) {
        self.draft = match body {
            Some(body) if !body.is_empty() => QueryDraft::Custom(body),
            _ => QueryDraft::Empty,
        };
    }

    /// Text that [`submit_draft`](Self::submit_draft) would send.
    pub fn query_text(&self) -> Option<&str> {
        self.draft.text()
    }

    /// Submits the current draft.
    pub fn submit_draft(&mut self) -> Vec<Effect> {
        match self.draft.text().map(str::to_string) {
            Some(text) => self.submit(text),
            None => {
                debug!("Nothing to submit");
                Vec::new()
            }
        }
    }

    /// Submits `query` in the selected workgroup.
    ///
    /// Supersedes the current execution: its status and results are cleared
    /// and late responses for it are discarded.
    pub fn submit(&mut self, query: impl Into<String>) -> Vec<Effect> {
        let query = query.into();
        if query.trim().is_empty() {
            debug!("Ignoring submission of empty query");
            return Vec::new();
        }
        let Some(workgroup) = self.selected_workgroup.as_ref() else {
            warn!("Ignoring submission: no workgroup selected");
            return Vec::new();
        };

        let request = SubmitRequest::new(workgroup.name.clone(), query)
            .with_database(self.defaults.database.clone())
            .with_output_location(self.defaults.output_location.clone());

        self.execution.reset();
        self.results.reset();
        vec![self.issue(Request::Submit(request), false)]
    }

    /// Displays an existing execution, waiting for it if it is still running.
    pub fn open_execution(&mut self, id: ExecutionId) -> Vec<Effect> {
        if self.submission.value.ok() == Some(&id) && self.submission.waiting.is_none() {
            return Vec::new();
        }

        info!("Opening execution {}", id);
        self.submission.reset();
        self.submission.value = AsyncResult::Ok(id.clone());
        self.execution.reset();
        self.results.reset();
        vec![self.issue(Request::Poll(id), false)]
    }

    /// Requests the next page of `list`.
    ///
    /// Does nothing unless the list has loaded and has a continuation token.
    /// A second call while one is in flight supersedes the first.
    pub fn load_more(&mut self, list: ListKind) -> Vec<Effect> {
        let request = match list {
            ListKind::Workgroups => match self.workgroups.value.ok() {
                Some(page) if page.has_more() => Request::Workgroups {
                    previous: Some(page.clone()),
                },
                _ => return Vec::new(),
            },
            ListKind::SavedQueries => {
                match (self.saved_queries.value.ok(), &self.selected_workgroup) {
                    (Some(page), Some(workgroup)) if page.has_more() => Request::SavedQueries {
                        workgroup: workgroup.name.clone(),
                        previous: Some(page.clone()),
                    },
                    _ => return Vec::new(),
                }
            }
            ListKind::Executions => {
                match (self.executions.value.ok(), &self.selected_workgroup) {
                    (Some(page), Some(workgroup)) if page.has_more() => Request::Executions {
                        workgroup: workgroup.name.clone(),
                        previous: Some(page.clone()),
                    },
                    _ => return Vec::new(),
                }
            }
            ListKind::Results => {
                match (self.results.value.ok(), self.submission.value.ok()) {
                    (Some(results), Some(id)) if results.rows.has_more() => Request::Results {
                        execution_id: id.clone(),
                        previous: Some(results.clone()),
                    },
                    _ => return Vec::new(),
                }
            }
        };

        vec![self.issue(request, true)]
    }

    /// Re-issues the last request of `stage`, restarting it at pending.
    pub fn retry(&mut self, stage: Stage) -> Vec<Effect> {
        let last = match stage {
            Stage::Workgroups => self.workgroups.last_request.clone(),
            Stage::SavedQueries => self.saved_queries.last_request.clone(),
            Stage::Executions => self.executions.last_request.clone(),
            Stage::Submission => self.submission.last_request.clone(),
            Stage::Execution => self.execution.last_request.clone(),
            Stage::Results => self.results.last_request.clone(),
        };

        match last {
            Some(Request::Submit(request)) => {
                self.execution.reset();
                self.results.reset();
                vec![self.issue(Request::Submit(request), false)]
            }
            Some(request) => vec![self.issue(request, false)],
            None => {
                debug!("Nothing to retry for {:?}", stage);
                Vec::new()
            }
        }
    }

    /// Applies a completed request and returns the follow-up requests.
    pub fn apply(&mut self, completion: Completion) -> Vec<Effect> {
        let Completion { ticket, response } = completion;
        let stage = response.stage();

        let accepted = match stage {
            Stage::Workgroups => self.workgroups.accepts(ticket),
            Stage::SavedQueries => self.saved_queries.accepts(ticket),
            Stage::Executions => self.executions.accepts(ticket),
            Stage::Submission => self.submission.accepts(ticket),
            Stage::Execution => self.execution.accepts(ticket),
            Stage::Results => self.results.accepts(ticket),
        };
        if !accepted {
            warn!("Discarding stale {:?} response {}", stage, ticket);
            return Vec::new();
        }

        match response {
            Response::Workgroups(result) => {
                self.workgroups.resolve(result);
                if self.selected_workgroup.is_some() {
                    return Vec::new();
                }
                let first = self
                    .workgroups
                    .value
                    .ok()
                    .and_then(|page| page.items.first().cloned());
                match first {
                    Some(first) => self.select_workgroup(first),
                    None => Vec::new(),
                }
            }
            Response::SavedQueries(result) => {
                self.saved_queries.resolve(result);
                Vec::new()
            }
            Response::Executions(result) => {
                self.executions.resolve(result);
                Vec::new()
            }
            Response::Submitted(result) => {
                self.submission.resolve(result);
                let Some(id) = self.submission.value.ok().cloned() else {
                    return Vec::new();
                };
                info!("Submitted execution {}", id);

                let mut effects = vec![self.issue(Request::Poll(id), false)];
                if let Some(workgroup) = self.selected_workgroup.clone() {
                    effects.push(self.issue(
                        Request::Executions {
                            workgroup: workgroup.name,
                            previous: None,
                        },
                        true,
                    ));
                }
                effects
            }
            Response::Finished(result) => {
                self.execution.resolve(result);
                let Some(execution_id) = self.execution.value.ok().map(|e| e.id.clone()) else {
                    return Vec::new();
                };
                vec![self.issue(
                    Request::Results {
                        execution_id,
                        previous: None,
                    },
                    false,
                )]
            }
            Response::Results(result) => {
                self.results.resolve(result);
                Vec::new()
            }
        }
    }

    /// Copies the renderable state.
    pub fn snapshot(&self) -> WorkbenchSnapshot {
        let mut refreshing = Vec::new();
        for (list, waiting, loaded) in [
            (
                ListKind::Workgroups,
                self.workgroups.waiting.is_some(),
                self.workgroups.value.is_ok(),
            ),
            (
                ListKind::SavedQueries,
                self.saved_queries.waiting.is_some(),
                self.saved_queries.value.is_ok(),
            ),
            (
                ListKind::Executions,
                self.executions.waiting.is_some(),
                self.executions.value.is_ok(),
            ),
            (
                ListKind::Results,
                self.results.waiting.is_some(),
                self.results.value.is_ok(),
            ),
        ] {
            if waiting && loaded {
                refreshing.push(list);
            }
        }

        WorkbenchSnapshot {
            workgroups: self.workgroups.value.clone(),
            selected_workgroup: self.selected_workgroup.clone(),
            saved_queries: self.saved_queries.value.clone(),
            draft: self.draft.clone(),
            executions: self.executions.value.clone(),
            submission: self.submission.value.clone(),
            execution: self.execution.value.clone(),
            results: self.results.value.clone(),
            refreshing,
        }
    }
}
