//! Domain types for the query service.
//!
//! Executions, workgroups, saved queries and result sets as the rest of the
//! crate sees them, independent of the wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ConsoleError, Result};
use crate::paging::Page;

/// Identifier of one query execution, assigned by the service on submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Lifecycle state of a query execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl QueryState {
    /// Returns the state as the service spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parses a state string from the service.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "QUEUED" => Ok(Self::Queued),
            "RUNNING" => Ok(Self::Running),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(ConsoleError::remote(format!(
                "Unknown query execution state: {other}"
            ))),
        }
    }

    /// Returns true once the service will no longer change this execution.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine statistics reported for an execution that has run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatistics {
    /// Time the engine spent executing the query.
    pub engine_execution_time_ms: Option<u64>,
    /// Bytes read from the data source.
    pub data_scanned_bytes: Option<u64>,
}

impl ExecutionStatistics {
    /// Human-readable summary, e.g. `1.25 s, 3.40 MB scanned`.
    pub fn summary(&self) -> String {
        let time = self
            .engine_execution_time_ms
            .map(|ms| format!("{:.2} s", ms as f64 / 1000.0))
            .unwrap_or_else(|| "? s".to_string());
        let scanned = self
            .data_scanned_bytes
            .map(|b| format!("{:.2} MB", b as f64 / 1024.0 / 1024.0))
            .unwrap_or_else(|| "? MB".to_string());
        format!("{time}, {scanned} scanned")
    }
}

/// One run of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryExecution {
    pub id: ExecutionId,
    pub query: String,
    pub status: QueryState,
    /// Service-supplied explanation for the latest state change, if any.
    pub state_reason: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    pub workgroup: Option<String>,
    pub catalog: Option<String>,
    pub database: Option<String>,
    pub output_location: Option<String>,
    pub statistics: Option<ExecutionStatistics>,
}

impl QueryExecution {
    /// Creates an execution with only the required fields set.
    pub fn new(id: impl Into<String>, query: impl Into<String>, status: QueryState) -> Self {
        Self {
            id: ExecutionId::new(id),
            query: query.into(),
            status,
            state_reason: None,
            created: None,
            completed: None,
            workgroup: None,
            catalog: None,
            database: None,
            output_location: None,
            statistics: None,
        }
    }

    pub fn with_workgroup(mut self, workgroup: impl Into<String>) -> Self {
        self.workgroup = Some(workgroup.into());
        self
    }

    /// Query text shortened for list display.
    pub fn trimmed_query(&self) -> String {
        trim_query(&self.query)
    }
}

/// Number of leading characters kept by [`trim_query`].
const TRIM_HEAD_CHARS: usize = 30;
/// Number of trailing characters kept by [`trim_query`].
const TRIM_TAIL_CHARS: usize = 20;

/// Shortens long query text to `head … tail`.
///
/// Queries of up to 30 characters are returned unchanged.
pub fn trim_query(query: &str) -> String {
    let len = query.chars().count();
    if len <= TRIM_HEAD_CHARS {
        return query.to_string();
    }
    let head: String = query.chars().take(TRIM_HEAD_CHARS).collect();
    let tail: String = query.chars().skip(len.saturating_sub(TRIM_TAIL_CHARS)).collect();
    format!("{head} … {tail}")
}

/// A named execution context for submitted queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Workgroup {
    pub name: String,
}

impl Workgroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A persisted, named query template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedQuery {
    /// Service-assigned identifier.
    pub key: String,
    pub name: String,
    pub body: String,
    pub description: Option<String>,
}

impl SavedQuery {
    pub fn new(key: impl Into<String>, name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            body: body.into(),
            description: None,
        }
    }
}

/// Parameters for starting an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub workgroup: String,
    pub query: String,
    /// Database the query runs against, when not qualified in the text.
    pub database: Option<String>,
    /// Where the service writes result files. Falls back to the workgroup setting.
    pub output_location: Option<String>,
}

impl SubmitRequest {
    pub fn new(workgroup: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            workgroup: workgroup.into(),
            query: query.into(),
            database: None,
            output_location: None,
        }
    }

    pub fn with_database(mut self, database: Option<String>) -> Self {
        self.database = database;
        self
    }

    pub fn with_output_location(mut self, output_location: Option<String>) -> Self {
        self.output_location = output_location;
        self
    }
}

/// Metadata about a column in a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Column type as reported by the service (`varchar`, `bigint`, ...).
    pub data_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A row as returned on the wire: one optional string per cell.
pub type RawRow = Vec<Option<String>>;

/// One page of undecoded results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResultPage {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<RawRow>,
    pub next_token: Option<String>,
}

/// A decoded row.
pub type Row = Vec<Value>;

/// A single decoded result cell.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Converts a raw cell according to its column type.
    pub fn decode(raw: Option<&str>, data_type: &str) -> Result<Self> {
        let Some(raw) = raw else {
            return Ok(Value::Null);
        };

        // Parameterised types such as decimal(10,2) or varchar(64) match on the base name.
        let base = data_type
            .split('(')
            .next()
            .unwrap_or(data_type)
            .trim()
            .to_lowercase();

        match base.as_str() {
            "varchar" | "char" | "string" | "date" | "timestamp" | "time" | "json" => {
                Ok(Value::String(raw.to_string()))
            }
            "integer" | "int" | "bigint" | "smallint" | "tinyint" => raw
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| ConsoleError::decode(format!("'{raw}' is not a valid {base}: {e}"))),
            "double" | "float" | "real" | "decimal" => raw
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| ConsoleError::decode(format!("'{raw}' is not a valid {base}: {e}"))),
            "boolean" => match raw {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(ConsoleError::decode(format!("'{raw}' is not a valid boolean"))),
            },
            _ => Err(ConsoleError::decode(format!(
                "Don't know how to decode column type {data_type}"
            ))),
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

/// Decoded results of one execution, with the rows loaded so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResults {
    pub columns: Vec<ColumnInfo>,
    pub rows: Page<Row>,
}

impl QueryResults {
    /// Returns every loaded value of the named column, in row order.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        Some(
            self.rows
                .items
                .iter()
                .map(|row| row.get(idx).unwrap_or(&Value::Null))
                .collect(),
        )
    }

    pub fn row_count(&self) -> usize {
        self.rows.items.len()
    }
}

/// Decodes one raw row against its column metadata.
///
/// Cells beyond the declared columns are read as `varchar`; some statements
/// (e.g. table repairs) return an informational row with no column metadata.
pub fn decode_row(columns: &[ColumnInfo], raw: &[Option<String>]) -> Result<Row> {
    raw.iter()
        .enumerate()
        .map(|(i, cell)| {
            let data_type = columns.get(i).map_or("varchar", |c| c.data_type.as_str());
            Value::decode(cell.as_deref(), data_type)
        })
        .collect()
}

/// Returns true when `row` repeats the column names, which the service sends
/// as the first row of a statement's first result page.
pub fn is_header_row(columns: &[ColumnInfo], row: &[Option<String>]) -> bool {
    !columns.is_empty()
        && columns.len() == row.len()
        && columns
            .iter()
            .zip(row)
            .all(|(c, cell)| cell.as_deref() == Some(c.name.as_str()))
}
