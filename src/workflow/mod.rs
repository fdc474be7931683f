//! Query workbench orchestration.
//!
//! Coordinates the workgroup, saved query and execution lists with the
//! submit → poll → results chain of the current execution.

mod actor;
mod state;

pub use actor::{WorkbenchActor, WorkbenchCommand, WorkbenchHandle};
pub use state::{
    Completion, Effect, ListKind, QueryDraft, Request, Response, Stage, SubmitDefaults, Ticket,
    WorkbenchSnapshot, WorkbenchState,
};
