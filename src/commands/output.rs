//! Transport-agnostic command output.
//!
//! Commands describe their results as a [`CommandOutput`] for people and a
//! JSON value for scripts; [`Report::render`] picks one per [`OutputFormat`].

use serde::Serialize;

use crate::athena::{QueryExecution, QueryResults, SavedQuery, Workgroup};
use crate::error::{ConsoleError, Result};
use crate::paging::Page;

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Aligned tables and plain messages.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {s}. Expected: text or json")),
        }
    }
}

/// Human-readable command output.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    /// Informational message.
    Info(String),

    /// Structured table data for display.
    Table {
        /// Column headers.
        headers: Vec<String>,
        /// Row data (each row is a vector of cell values).
        rows: Vec<Vec<String>>,
    },

    /// Multiple outputs, printed in order.
    Multiple(Vec<CommandOutput>),
}

impl CommandOutput {
    pub fn info(msg: impl Into<String>) -> Self {
        Self::Info(msg.into())
    }

    pub fn table(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self::Table { headers, rows }
    }

    pub fn multiple(outputs: Vec<CommandOutput>) -> Self {
        Self::Multiple(outputs)
    }

    /// Formats as plain text.
    pub fn to_text(&self) -> String {
        match self {
            Self::Info(msg) => msg.clone(),
            Self::Table { headers, rows } => format_table(headers, rows),
            Self::Multiple(outputs) => outputs
                .iter()
                .map(Self::to_text)
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A command result in both presentations.
#[derive(Debug, Clone)]
pub struct Report {
    pub text: CommandOutput,
    pub data: serde_json::Value,
}

impl Report {
    /// Builds a report, serializing `data` for the JSON presentation.
    pub fn new(text: CommandOutput, data: &impl Serialize) -> Result<Self> {
        let data = serde_json::to_value(data)
            .map_err(|e| ConsoleError::internal(format!("Failed to serialize output: {e}")))?;
        Ok(Self { text, data })
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Text => Ok(self.text.to_text()),
            OutputFormat::Json => serde_json::to_string_pretty(&self.data)
                .map_err(|e| ConsoleError::internal(format!("Failed to serialize output: {e}"))),
        }
    }
}

fn more_hint(has_more: bool, flag: &str) -> Option<CommandOutput> {
    has_more.then(|| CommandOutput::info(format!("More available; rerun with {flag}.")))
}

fn with_footer(table: CommandOutput, footer: Option<CommandOutput>) -> CommandOutput {
    match footer {
        Some(footer) => CommandOutput::multiple(vec![table, footer]),
        None => table,
    }
}

pub fn workgroups_report(page: &Page<Workgroup>) -> Result<Report> {
    let rows = page.items.iter().map(|w| vec![w.name.clone()]).collect();
    let table = CommandOutput::table(vec!["Workgroup".to_string()], rows);
    Report::new(with_footer(table, more_hint(page.has_more(), "--all")), page)
}

pub fn saved_queries_report(page: &Page<SavedQuery>) -> Result<Report> {
    let rows = page
        .items
        .iter()
        .map(|q| {
            vec![
                q.name.clone(),
                q.description.clone().unwrap_or_default(),
                crate::athena::trim_query(&q.body),
            ]
        })
        .collect();
    let table = CommandOutput::table(
        vec![
            "Name".to_string(),
            "Description".to_string(),
            "Query".to_string(),
        ],
        rows,
    );
    Report::new(with_footer(table, more_hint(page.has_more(), "--all")), page)
}

pub fn executions_report(page: &Page<QueryExecution>) -> Result<Report> {
    let rows = page
        .items
        .iter()
        .map(|e| {
            vec![
                e.id.to_string(),
                e.status.to_string(),
                e.created
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default(),
                e.trimmed_query(),
            ]
        })
        .collect();
    let table = CommandOutput::table(
        vec![
            "Execution".to_string(),
            "State".to_string(),
            "Created".to_string(),
            "Query".to_string(),
        ],
        rows,
    );
    Report::new(with_footer(table, more_hint(page.has_more(), "--all")), page)
}

/// Reports one execution's status.
pub fn execution_report(execution: &QueryExecution) -> Result<Report> {
    let mut lines = vec![format!("Execution {}: {}", execution.id, execution.status)];
    if let Some(reason) = &execution.state_reason {
        lines.push(format!("Reason: {reason}"));
    }
    if let Some(stats) = &execution.statistics {
        lines.push(format!("Statistics: {}", stats.summary()));
    }
    lines.push(format!("Query: {}", execution.trimmed_query()));

    Report::new(CommandOutput::info(lines.join("\n")), execution)
}

pub fn results_report(results: &QueryResults) -> Result<Report> {
    let headers = results.columns.iter().map(|c| c.name.clone()).collect();
    let rows = results
        .rows
        .items
        .iter()
        .map(|row| row.iter().map(|v| v.to_display_string()).collect())
        .collect();

    let count = results.row_count();
    let summary = CommandOutput::info(format!(
        "{count} row{}",
        if count == 1 { "" } else { "s" }
    ));
    let mut parts = vec![CommandOutput::table(headers, rows), summary];
    parts.extend(more_hint(results.rows.has_more(), "--all"));

    Report::new(CommandOutput::multiple(parts), results)
}

/// Formats a table as a string for display.
fn format_table(headers: &[String], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return String::new();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let mut output = String::new();

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    output.push_str(&header_line.join(" │ "));
    output.push('\n');

    let separator: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    output.push_str(&separator.join("─┼─"));
    output.push('\n');

    for row in rows {
        let row_line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let width = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = width)
            })
            .collect();
        output.push_str(row_line.join(" │ ").trim_end());
        output.push('\n');
    }

    output.trim_end().to_string()
}
