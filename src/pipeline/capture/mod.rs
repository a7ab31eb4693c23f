//! Guide capture: drives the portal's paged results table through a
//! browser-automation collaborator and yields one `GuideRow` per guide.

pub mod adapter;
pub mod browser;
pub mod detail;
pub mod parse;

pub use adapter::{DateRange, GuideCapture, GuidePages};
pub use browser::{BrowserDriver, Cell, LoadState, Row, WaitTarget};
pub use detail::{CapturedSession, SessionSource};
pub use parse::{parse_row, GuideRow, RowParseError};

use thiserror::Error;

/// Navigation or extraction failure. Fatal to the capture call.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Selector not found: {0}")]
    SelectorNotFound(String),

    #[error("Portal authentication failed: {0}")]
    Authentication(String),

    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("Detail capture failed for guide {numero_guia}: {reason}")]
    Detail { numero_guia: String, reason: String },
}
