//! Command execution for the command-line interface.
//!
//! Each [`Command`] runs against a [`QueryService`] and produces a
//! [`Report`]; the binary only parses arguments and prints.

pub mod output;

use std::sync::Arc;

use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::athena::{ExecutionId, QueryResults, QueryService, SubmitRequest};
use crate::cli::Command;
use crate::config::ServiceConfig;
use crate::error::{ConsoleError, Result};
use crate::paging::{
    self, ExecutionSource, PagedSource, ResultSource, SavedQuerySource, WorkgroupSource,
    DEFAULT_MAX_PAGES,
};
use crate::poller::Poller;
use output::{CommandOutput, Report};

/// Everything a command needs to run.
pub struct CommandContext {
    pub service: Arc<dyn QueryService>,
    pub poller: Poller,
    pub settings: ServiceConfig,
    /// Cancels a running command, e.g. on Ctrl-C.
    pub cancel: CancellationToken,
}

impl CommandContext {
    pub fn new(service: Arc<dyn QueryService>, poller: Poller, settings: ServiceConfig) -> Self {
        Self {
            service,
            poller,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Runs `command` and returns its report.
    pub async fn execute(&self, command: &Command) -> Result<Report> {
        match command {
            Command::Workgroups { all } => {
                let page = read(&WorkgroupSource::new(self.service.clone()), *all).await?;
                output::workgroups_report(&page)
            }
            Command::Queries { workgroup, all } => {
                let workgroup = self.resolve_workgroup(workgroup.as_deref()).await?;
                let source = SavedQuerySource::new(self.service.clone(), workgroup);
                output::saved_queries_report(&read(&source, *all).await?)
            }
            Command::Executions { workgroup, all } => {
                let workgroup = self.resolve_workgroup(workgroup.as_deref()).await?;
                let source = ExecutionSource::new(self.service.clone(), workgroup);
                output::executions_report(&read(&source, *all).await?)
            }
            Command::Run {
                sql,
                saved,
                workgroup,
                all,
            } => {
                self.run(sql.as_deref(), saved.as_deref(), workgroup.as_deref(), *all)
                    .await
            }
            Command::Results { id, all } => {
                let results = self.results(ExecutionId::new(id.as_str()), *all).await?;
                output::results_report(&results)
            }
            Command::Status { ids } => self.status(ids).await,
        }
    }

    /// Uses `explicit`, then the configured workgroup, then the first one listed.
    async fn resolve_workgroup(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(name) = explicit.or(self.settings.workgroup.as_deref()) {
            return Ok(name.to_string());
        }

        let page = paging::fetch(&WorkgroupSource::new(self.service.clone())).await?;
        let first = page
            .items
            .into_iter()
            .next()
            .ok_or_else(|| ConsoleError::config("No workgroups available"))?;
        debug!("Defaulting to workgroup {}", first.name);
        Ok(first.name)
    }

    async fn run(
        &self,
        sql: Option<&str>,
        saved: Option<&str>,
        workgroup: Option<&str>,
        all: bool,
    ) -> Result<Report> {
        let workgroup = self.resolve_workgroup(workgroup).await?;

        let query = match (sql, saved) {
            (Some(sql), _) => sql.to_string(),
            (None, Some(name)) => {
                let source = SavedQuerySource::new(self.service.clone(), workgroup.clone());
                let saved = paging::fetch_all(&source, DEFAULT_MAX_PAGES).await?;
                saved
                    .items
                    .into_iter()
                    .find(|q| q.name == name)
                    .map(|q| q.body)
                    .ok_or_else(|| {
                        ConsoleError::config(format!(
                            "Saved query '{name}' not found in workgroup {workgroup}"
                        ))
                    })?
            }
            (None, None) => return Err(ConsoleError::config("No query given")),
        };
        if query.trim().is_empty() {
            return Err(ConsoleError::config("Query text is empty"));
        }

        let request = SubmitRequest::new(workgroup, query)
            .with_database(self.settings.database.clone())
            .with_output_location(self.settings.output_location.clone());
        let id = self.service.submit(&request).await?;
        info!("Submitted execution {}", id);

        let execution = self
            .poller
            .wait_for_completion(self.service.as_ref(), &id, &self.cancel)
            .await?;
        let results = self.results(id, all).await?;

        let text = CommandOutput::multiple(vec![
            output::execution_report(&execution)?.text,
            output::results_report(&results)?.text,
        ]);
        Report::new(
            text,
            &serde_json::json!({ "execution": execution, "results": results }),
        )
    }

    async fn results(&self, id: ExecutionId, all: bool) -> Result<QueryResults> {
        let source = ResultSource::new(self.service.clone(), id);
        let mut results = source.first().await?;
        let mut pages = 1;
        while all && results.rows.has_more() && pages < DEFAULT_MAX_PAGES {
            if self.cancel.is_cancelled() {
                return Err(ConsoleError::Cancelled);
            }
            results = source.load_more(&results).await?;
            pages += 1;
        }
        Ok(results)
    }

    async fn status(&self, ids: &[String]) -> Result<Report> {
        let ids: Vec<ExecutionId> = ids.iter().map(|id| ExecutionId::new(id.as_str())).collect();
        let executions =
            try_join_all(ids.iter().map(|id| self.service.get_execution(id))).await?;

        let reports = executions
            .iter()
            .map(|e| output::execution_report(e).map(|r| r.text))
            .collect::<Result<Vec<_>>>()?;
        Report::new(CommandOutput::multiple(reports), &executions)
    }
}

/// Reads the first page, or every page when `all` is set.
async fn read<S>(source: &S, all: bool) -> Result<paging::Page<S::Item>>
where
    S: PagedSource,
{
    if all {
        paging::fetch_all(source, DEFAULT_MAX_PAGES).await
    } else {
        paging::fetch(source).await
    }
}
