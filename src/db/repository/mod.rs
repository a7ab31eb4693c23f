//! Repository layer: ledger-side database operations.
//!
//! Staging and queue tables are owned by their pipeline stores; this module
//! covers the tables the pipeline writes into: guides, executions and
//! routed documents.

mod document;
mod execution;
mod guide;

pub use document::*;
pub use execution::*;
pub use guide::*;

fn opt_u32(value: Option<i64>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}
