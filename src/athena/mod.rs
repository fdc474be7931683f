//! Query service abstraction for athena-console.
//!
//! Provides a trait-based interface over the remote query service, allowing
//! the HTTP client and the in-memory doubles to be used interchangeably.

mod http;
mod mock;
mod types;

pub use http::HttpQueryService;
pub use mock::{FailingQueryService, MockQueryService, ServiceCall};
pub use types::{
    decode_row, is_header_row, trim_query, ColumnInfo, ExecutionId, ExecutionStatistics,
    QueryExecution, QueryResults, QueryState, RawResultPage, RawRow, Row, SavedQuery,
    SubmitRequest, Value, Workgroup,
};

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::paging::Page;

/// Operations consumed from the remote query service.
///
/// All operations are async and fail with
/// [`ConsoleError::RemoteService`](crate::error::ConsoleError::RemoteService)
/// carrying the provider's message. Nothing here retries.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Starts an execution and returns its id.
    async fn submit(&self, request: &SubmitRequest) -> Result<ExecutionId>;

    /// Returns the current state of an execution.
    async fn get_execution(&self, id: &ExecutionId) -> Result<QueryExecution>;

    /// Returns one page of undecoded results for a finished execution.
    async fn get_results(&self, id: &ExecutionId, token: Option<&str>) -> Result<RawResultPage>;

    /// Lists workgroups.
    async fn list_workgroups(&self, token: Option<&str>) -> Result<Page<Workgroup>>;

    /// Lists saved queries of a workgroup.
    async fn list_saved_queries(
        &self,
        workgroup: &str,
        token: Option<&str>,
    ) -> Result<Page<SavedQuery>>;

    /// Lists executions of a workgroup, most recent first.
    async fn list_executions(
        &self,
        workgroup: &str,
        token: Option<&str>,
    ) -> Result<Page<QueryExecution>>;
}

/// Creates the query service described by `config`.
///
/// This is the central factory function for service clients.
pub fn connect(config: &Config) -> Result<Arc<dyn QueryService>> {
    let client = HttpQueryService::new(&config.service)?;
    Ok(Arc::new(client))
}
