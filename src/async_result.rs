//! Lifecycle of one outstanding request.

use crate::error::{ConsoleError, Result};

/// The state of a single request as observed by its consumer.
///
/// Transitions are `Init → Pending → (Ok | Err)`; a refetch restarts at
/// `Pending`.
#[derive(Debug, Clone, PartialEq)]
pub enum AsyncResult<T> {
    /// Nothing has been requested yet.
    Init,
    /// A request is in flight.
    Pending,
    /// The request succeeded.
    Ok(T),
    /// The request failed.
    Err(ConsoleError),
}

impl<T> AsyncResult<T> {
    pub fn is_init(&self) -> bool {
        matches!(self, Self::Init)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn is_err(&self) -> bool {
        matches!(self, Self::Err(_))
    }

    /// Returns the value if the request succeeded.
    pub fn ok(&self) -> Option<&T> {
        match self {
            Self::Ok(value) => Some(value),
            Self::Init | Self::Pending | Self::Err(_) => None,
        }
    }

    /// Returns the error if the request failed.
    pub fn err(&self) -> Option<&ConsoleError> {
        match self {
            Self::Err(error) => Some(error),
            Self::Init | Self::Pending | Self::Ok(_) => None,
        }
    }

    /// Short state name for display and logs.
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Pending => "pending",
            Self::Ok(_) => "ok",
            Self::Err(_) => "error",
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> AsyncResult<U> {
        match self {
            Self::Init => AsyncResult::Init,
            Self::Pending => AsyncResult::Pending,
            Self::Ok(value) => AsyncResult::Ok(f(value)),
            Self::Err(error) => AsyncResult::Err(error),
        }
    }
}

impl<T> Default for AsyncResult<T> {
    fn default() -> Self {
        Self::Init
    }
}

impl<T> From<Result<T>> for AsyncResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(error) => Self::Err(error),
        }
    }
}
