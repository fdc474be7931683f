//! Actor that drives a [`WorkbenchState`] against a query service.
//!
//! The state decides what to fetch; the actor runs each request on its own
//! task and feeds the completion back. Views talk to the actor through a
//! [`WorkbenchHandle`] and observe it through a `watch` channel of
//! [`WorkbenchSnapshot`]s.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::state::{
    Completion, Effect, ListKind, Request, Response, Stage, WorkbenchSnapshot, WorkbenchState,
};
use crate::athena::{ExecutionId, QueryService, SavedQuery, Workgroup};
use crate::error::{ConsoleError, Result};
use crate::paging::{self, ExecutionSource, ResultSource, SavedQuerySource, WorkgroupSource};
use crate::poller::Poller;

/// Commands a view sends to the workbench.
#[derive(Debug)]
pub enum WorkbenchCommand {
    SelectWorkgroup(Workgroup),
    SelectSavedQuery(Option<SavedQuery>),
    SetQueryBody(Option<String>),
    /// Submit the given text, or the current draft when `None`.
    Submit(Option<String>),
    OpenExecution(ExecutionId),
    LoadMore(ListKind),
    Retry(Stage),
    Shutdown,
}

/// Owns the workbench state and runs its requests.
pub struct WorkbenchActor {
    state: WorkbenchState,
    service: Arc<dyn QueryService>,
    poller: Poller,
    receiver: mpsc::Receiver<WorkbenchCommand>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    snapshot_tx: watch::Sender<WorkbenchSnapshot>,
    /// Parent of every task token; cancelled on shutdown.
    root: CancellationToken,
    /// Token for the submit, poll and results chain of the current execution.
    execution: CancellationToken,
}

impl WorkbenchActor {
    /// Creates a new actor and returns a handle for communication.
    pub fn spawn(
        state: WorkbenchState,
        service: Arc<dyn QueryService>,
        poller: Poller,
    ) -> (WorkbenchHandle, Self) {
        let (sender, receiver) = mpsc::channel(32);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(state.snapshot());
        let root = CancellationToken::new();
        let execution = root.child_token();

        let actor = Self {
            state,
            service,
            poller,
            receiver,
            completion_tx,
            completion_rx,
            snapshot_tx,
            root,
            execution,
        };

        (WorkbenchHandle { sender, snapshots }, actor)
    }

    /// Runs the actor loop until Shutdown is received or every handle is dropped.
    pub async fn run(mut self) {
        let effects = self.state.start();
        self.dispatch(effects);
        self.publish();

        loop {
            tokio::select! {
                biased;

                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if matches!(cmd, WorkbenchCommand::Shutdown) {
                        break;
                    }
                    let effects = self.handle_command(cmd);
                    self.dispatch(effects);
                }

                Some(completion) = self.completion_rx.recv() => {
                    let effects = self.state.apply(completion);
                    self.dispatch(effects);
                }
            }
            self.publish();
        }

        info!("Workbench shutting down");
        self.root.cancel();
    }

    fn handle_command(&mut self, cmd: WorkbenchCommand) -> Vec<Effect> {
        debug!("Workbench command: {:?}", cmd);
        match cmd {
            WorkbenchCommand::SelectWorkgroup(workgroup) => self.state.select_workgroup(workgroup),
            WorkbenchCommand::SelectSavedQuery(query) => {
                self.state.select_saved_query(query);
                Vec::new()
            }
            WorkbenchCommand::SetQueryBody(body) => {
                self.state.set_query_body(body);
                Vec::new()
            }
            WorkbenchCommand::Submit(Some(query)) => self.state.submit(query),
            WorkbenchCommand::Submit(None) => self.state.submit_draft(),
            WorkbenchCommand::OpenExecution(id) => self.state.open_execution(id),
            WorkbenchCommand::LoadMore(list) => self.state.load_more(list),
            WorkbenchCommand::Retry(stage) => self.state.retry(stage),
            WorkbenchCommand::Shutdown => Vec::new(),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.state.snapshot());
    }

    /// Spawns one task per effect.
    fn dispatch(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            // A new submission or opened execution supersedes the current chain.
            if matches!(effect.request, Request::Submit(_) | Request::Poll(_)) {
                self.execution.cancel();
                self.execution = self.root.child_token();
            }
            let cancel = match effect.request {
                Request::Submit(_) | Request::Poll(_) | Request::Results { .. } => {
                    self.execution.clone()
                }
                _ => self.root.child_token(),
            };

            let service = Arc::clone(&self.service);
            let poller = self.poller.clone();
            let completion_tx = self.completion_tx.clone();

            tokio::spawn(async move {
                let ticket = effect.ticket;
                let response = tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Request {} cancelled", ticket);
                        return;
                    }
                    response = run_request(service, &poller, effect.request, &cancel) => response,
                };
                let _ = completion_tx.send(Completion { ticket, response });
            });
        }
    }
}

async fn run_request(
    service: Arc<dyn QueryService>,
    poller: &Poller,
    request: Request,
    cancel: &CancellationToken,
) -> Response {
    match request {
        Request::Workgroups { previous } => {
            let source = WorkgroupSource::new(service);
            Response::Workgroups(match previous {
                Some(previous) => paging::load_more(&source, &previous).await,
                None => paging::fetch(&source).await,
            })
        }
        Request::SavedQueries {
            workgroup,
            previous,
        } => {
            let source = SavedQuerySource::new(service, workgroup);
            Response::SavedQueries(match previous {
                Some(previous) => paging::load_more(&source, &previous).await,
                None => paging::fetch(&source).await,
            })
        }
        Request::Executions {
            workgroup,
            previous,
        } => {
            let source = ExecutionSource::new(service, workgroup);
            Response::Executions(match previous {
                Some(previous) => paging::load_more(&source, &previous).await,
                None => paging::fetch(&source).await,
            })
        }
        Request::Submit(request) => Response::Submitted(service.submit(&request).await),
        Request::Poll(id) => Response::Finished(
            poller
                .wait_for_completion(service.as_ref(), &id, cancel)
                .await,
        ),
        Request::Results {
            execution_id,
            previous,
        } => {
            let source = ResultSource::new(service, execution_id);
            Response::Results(match previous {
                Some(previous) => source.load_more(&previous).await,
                None => source.first().await,
            })
        }
    }
}

/// Handle for communicating with a running [`WorkbenchActor`].
#[derive(Clone)]
pub struct WorkbenchHandle {
    sender: mpsc::Sender<WorkbenchCommand>,
    snapshots: watch::Receiver<WorkbenchSnapshot>,
}

impl WorkbenchHandle {
    async fn send(&self, cmd: WorkbenchCommand) -> Result<()> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| ConsoleError::internal("Workbench actor closed"))
    }

    pub async fn on_workgroup_change(&self, workgroup: Workgroup) -> Result<()> {
        self.send(WorkbenchCommand::SelectWorkgroup(workgroup)).await
    }

    pub async fn on_query_change(&self, query: Option<SavedQuery>) -> Result<()> {
        self.send(WorkbenchCommand::SelectSavedQuery(query)).await
    }

    pub async fn on_query_body_change(&self, body: Option<String>) -> Result<()> {
        self.send(WorkbenchCommand::SetQueryBody(body)).await
    }

    /// Submits `query`, or the current draft when `None`.
    pub async fn on_submit(&self, query: Option<String>) -> Result<()> {
        self.send(WorkbenchCommand::Submit(query)).await
    }

    pub async fn on_open_execution(&self, id: ExecutionId) -> Result<()> {
        self.send(WorkbenchCommand::OpenExecution(id)).await
    }

    pub async fn on_load_more(&self, list: ListKind) -> Result<()> {
        self.send(WorkbenchCommand::LoadMore(list)).await
    }

    pub async fn on_retry(&self, stage: Stage) -> Result<()> {
        self.send(WorkbenchCommand::Retry(stage)).await
    }

    /// Stops the actor and cancels every outstanding request.
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(WorkbenchCommand::Shutdown)
            .await
            .map_err(|_| ConsoleError::internal("Workbench actor already closed"))
    }

    /// Latest published state.
    pub fn snapshot(&self) -> WorkbenchSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that is notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<WorkbenchSnapshot> {
        self.snapshots.clone()
    }

    /// Waits until a published snapshot satisfies `condition`.
    pub async fn wait_for(
        &self,
        condition: impl FnMut(&WorkbenchSnapshot) -> bool,
    ) -> Result<WorkbenchSnapshot> {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(condition)
            .await
            .map_err(|_| ConsoleError::internal("Workbench actor closed"))?;
        Ok(snapshot.clone())
    }
}
