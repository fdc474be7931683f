//! Error types for athena-console.
//!
//! Defines the main error enum used throughout the crate.

use thiserror::Error;

use crate::athena::QueryState;

/// Main error type for athena-console operations.
///
/// Errors are `Clone` so that a failed request can be stored in an
/// [`AsyncResult::Err`](crate::async_result::AsyncResult) slot and shown
/// more than once.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsoleError {
    /// Transport or service-level failure. The provider's message is passed through.
    #[error("Remote service error: {0}")]
    RemoteService(String),

    /// The execution reached a terminal state other than SUCCEEDED.
    #[error("Query execution {status}")]
    ExecutionFailed { status: QueryState },

    /// The service accepted a submission but returned no execution id.
    #[error("No execution id in submission response")]
    NoExecutionId,

    /// The poller gave up before the execution reached a terminal state.
    #[error("Execution still running after {attempts} status checks")]
    PollTimeout { attempts: u32 },

    /// The operation was abandoned by its owner.
    #[error("Operation cancelled")]
    Cancelled,

    /// A result cell could not be converted to its declared column type.
    #[error("Result decode error: {0}")]
    ResultDecode(String),

    /// Configuration errors (invalid config file, bad endpoint, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, closed channels, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConsoleError {
    /// Creates a remote service error with the given message.
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::RemoteService(msg.into())
    }

    /// Creates an execution failure for a terminal non-success state.
    pub fn execution_failed(status: QueryState) -> Self {
        Self::ExecutionFailed { status }
    }

    /// Creates a result decode error with the given message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::ResultDecode(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::RemoteService(_) => "Remote Service Error",
            Self::ExecutionFailed { .. } => "Execution Failed",
            Self::NoExecutionId => "Remote Service Error",
            Self::PollTimeout { .. } => "Poll Timeout",
            Self::Cancelled => "Cancelled",
            Self::ResultDecode(_) => "Result Decode Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using ConsoleError.
pub type Result<T> = std::result::Result<T, ConsoleError>;
