pub mod document;
pub mod enums;
pub mod ledger;
pub mod queue;
pub mod staged;
pub mod task;

pub use document::*;
pub use ledger::*;
pub use queue::*;
pub use staged::*;
pub use task::*;
