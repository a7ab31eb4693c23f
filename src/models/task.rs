use serde::{Deserialize, Serialize};

use super::enums::TaskStatus;

/// Status snapshot of one capture task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub task_id: String,
    pub total_guides: u32,
    pub processed_guides: u32,
    /// Staged rows that ended in `erro`.
    pub retry_guides: u32,
    pub total_execucoes: u32,
    pub status: TaskStatus,
    pub last_error: Option<String>,
    pub started_at: String,
    pub last_update: String,
    pub completed_at: Option<String>,
}
