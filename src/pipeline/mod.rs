//! Capture, staging and reconciliation pipeline, plus document routing.
//!
//! Components share nothing in memory: each one reads and writes the
//! database through the `&Connection` it is handed.

pub mod aggregate;
pub mod capture;
pub mod classifier;
pub mod error;
pub mod queue;
pub mod reconcile;
pub mod routing;
pub mod runner;
pub mod staging;
pub mod tasks;
pub mod worker;

pub use error::{PipelineError, Stage};
