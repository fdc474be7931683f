//! athena-console: a console for a remote SQL query service.
//!
//! This library exposes the core modules for the binary and for integration tests.

pub mod async_result;
pub mod athena;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod paging;
pub mod poller;
pub mod workflow;
