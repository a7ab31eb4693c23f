use serde::{Deserialize, Serialize};

use super::enums::QueueStatus;

/// A guide waiting for its detail page to be captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub task_id: String,
    pub numero_guia: String,
    pub data_execucao: String,
    pub status: QueueStatus,
    pub attempts: u32,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: u32,
    pub processing: u32,
    pub done: u32,
    pub error: u32,
}

impl QueueCounts {
    /// Guides still waiting for (or in) detail capture.
    pub fn unfinished(&self) -> u32 {
        self.pending + self.processing
    }
}
