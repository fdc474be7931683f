//! Integration tests for athena-console.

pub mod paging_test;
pub mod poller_test;
pub mod workflow_test;
