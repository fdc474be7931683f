//! Continuation-token pagination.
//!
//! A [`PagedSource`] returns one page per call. [`load_more`] appends the next
//! page to the items loaded so far; the service is the source of truth for
//! ordering, so items are never reordered or de-duplicated here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::athena::{
    decode_row, is_header_row, ColumnInfo, ExecutionId, QueryExecution, QueryResults,
    QueryService, RawRow, Row, SavedQuery, Workgroup,
};
use crate::error::Result;

/// Upper bound on pages drained by [`fetch_all`].
pub const DEFAULT_MAX_PAGES: usize = 100;

/// Items loaded so far plus the token for the next page.
///
/// A missing `next_token` means the sequence is exhausted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_token: Option<String>) -> Self {
        Self { items, next_token }
    }

    /// A final page holding `items`.
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), None)
    }

    pub fn has_more(&self) -> bool {
        self.next_token.is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends `next` to this page. The new token replaces the old one.
    pub fn append(mut self, next: Page<T>) -> Self {
        self.items.extend(next.items);
        self.next_token = next.next_token;
        self
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_token: self.next_token,
        }
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Something that can be read one page at a time.
#[async_trait]
pub trait PagedSource: Send + Sync {
    type Item: Clone + Send + Sync;

    /// Fetches the page at `token`, or the first page when `token` is `None`.
    async fn fetch_page(&self, token: Option<&str>) -> Result<Page<Self::Item>>;
}

/// Fetches the first page of `source`.
pub async fn fetch<S>(source: &S) -> Result<Page<S::Item>>
where
    S: PagedSource + ?Sized,
{
    source.fetch_page(None).await
}

/// Fetches the page after `previous` and appends it.
///
/// When `previous` has no continuation token the sequence is exhausted; no
/// request is issued and `previous` is returned unchanged.
pub async fn load_more<S>(source: &S, previous: &Page<S::Item>) -> Result<Page<S::Item>>
where
    S: PagedSource + ?Sized,
{
    let Some(token) = previous.next_token.as_deref() else {
        debug!("load_more called on an exhausted page, ignoring");
        return Ok(previous.clone());
    };

    let next = source.fetch_page(Some(token)).await?;
    debug!(
        "Loaded {} more items ({} total, more: {})",
        next.items.len(),
        previous.items.len() + next.items.len(),
        next.has_more()
    );
    Ok(previous.clone().append(next))
}

/// Follows continuation tokens until the source is exhausted or `max_pages`
/// pages have been read.
pub async fn fetch_all<S>(source: &S, max_pages: usize) -> Result<Page<S::Item>>
where
    S: PagedSource + ?Sized,
{
    let mut page = fetch(source).await?;
    let mut pages = 1;
    while page.has_more() && pages < max_pages {
        page = load_more(source, &page).await?;
        pages += 1;
    }
    Ok(page)
}

/// All workgroups visible to the caller.
#[derive(Clone)]
pub struct WorkgroupSource {
    service: Arc<dyn QueryService>,
}

impl WorkgroupSource {
    pub fn new(service: Arc<dyn QueryService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl PagedSource for WorkgroupSource {
    type Item = Workgroup;

    async fn fetch_page(&self, token: Option<&str>) -> Result<Page<Workgroup>> {
        self.service.list_workgroups(token).await
    }
}

/// Saved queries of one workgroup.
#[derive(Clone)]
pub struct SavedQuerySource {
    service: Arc<dyn QueryService>,
    workgroup: String,
}

impl SavedQuerySource {
    pub fn new(service: Arc<dyn QueryService>, workgroup: impl Into<String>) -> Self {
        Self {
            service,
            workgroup: workgroup.into(),
        }
    }
}

#[async_trait]
impl PagedSource for SavedQuerySource {
    type Item = SavedQuery;

    async fn fetch_page(&self, token: Option<&str>) -> Result<Page<SavedQuery>> {
        self.service.list_saved_queries(&self.workgroup, token).await
    }
}

/// Recent executions of one workgroup.
#[derive(Clone)]
pub struct ExecutionSource {
    service: Arc<dyn QueryService>,
    workgroup: String,
}

impl ExecutionSource {
    pub fn new(service: Arc<dyn QueryService>, workgroup: impl Into<String>) -> Self {
        Self {
            service,
            workgroup: workgroup.into(),
        }
    }
}

#[async_trait]
impl PagedSource for ExecutionSource {
    type Item = QueryExecution;

    async fn fetch_page(&self, token: Option<&str>) -> Result<Page<QueryExecution>> {
        self.service.list_executions(&self.workgroup, token).await
    }
}

/// Decoded result rows of one execution.
///
/// The header row the service prepends to the first page is dropped.
#[derive(Clone)]
pub struct ResultSource {
    service: Arc<dyn QueryService>,
    execution_id: ExecutionId,
}

impl ResultSource {
    pub fn new(service: Arc<dyn QueryService>, execution_id: ExecutionId) -> Self {
        Self {
            service,
            execution_id,
        }
    }

    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    /// Fetches the first page together with its column metadata.
    pub async fn first(&self) -> Result<QueryResults> {
        let raw = self.service.get_results(&self.execution_id, None).await?;
        let rows = Self::decode_page(&raw.columns, raw.rows, raw.next_token, true)?;
        Ok(QueryResults {
            columns: raw.columns,
            rows,
        })
    }

    /// Appends the next page of rows to `previous`.
    pub async fn load_more(&self, previous: &QueryResults) -> Result<QueryResults> {
        let rows = load_more(self, &previous.rows).await?;
        Ok(QueryResults {
            columns: previous.columns.clone(),
            rows,
        })
    }

    fn decode_page(
        columns: &[ColumnInfo],
        rows: Vec<RawRow>,
        next_token: Option<String>,
        first_page: bool,
    ) -> Result<Page<Row>> {
        let skip = usize::from(
            first_page && rows.first().is_some_and(|row| is_header_row(columns, row)),
        );
        let items = rows
            .iter()
            .skip(skip)
            .map(|raw| decode_row(columns, raw))
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(items, next_token))
    }
}

#[async_trait]
impl PagedSource for ResultSource {
    type Item = Row;

    async fn fetch_page(&self, token: Option<&str>) -> Result<Page<Row>> {
        let raw = self.service.get_results(&self.execution_id, token).await?;
        Self::decode_page(&raw.columns, raw.rows, raw.next_token, token.is_none())
    }
}
