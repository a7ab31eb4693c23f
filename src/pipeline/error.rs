use std::fmt;

use thiserror::Error;

use super::capture::AcquisitionError;

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Pipeline stage a fatal error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Capture,
    Staging,
    Reconciliation,
    Aggregation,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Capture => "capture",
            Self::Staging => "staging",
            Self::Reconciliation => "reconciliation",
            Self::Aggregation => "aggregation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run-level failure. Carries enough context for the initiator to resume.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Task {task_id}: acquisition failed: {source}")]
    Acquisition {
        task_id: String,
        #[source]
        source: AcquisitionError,
    },

    #[error("Task {task_id}: store unavailable during {stage}: {source}")]
    Store {
        task_id: String,
        stage: Stage,
        #[source]
        source: BoxedSource,
    },

    #[error("Task not found: {0}")]
    TaskNotFound(String),
}

impl PipelineError {
    /// Label used when a pass is not scoped to a single task.
    pub const ALL_TASKS: &'static str = "*";

    pub fn store(
        task_id: Option<&str>,
        stage: Stage,
        source: impl Into<BoxedSource>,
    ) -> Self {
        Self::Store {
            task_id: task_id.unwrap_or(Self::ALL_TASKS).to_string(),
            stage,
            source: source.into(),
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            Self::Acquisition { task_id, .. } | Self::Store { task_id, .. } => task_id,
            Self::TaskNotFound(task_id) => task_id,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::Acquisition { .. } => Stage::Capture,
            Self::Store { stage, .. } => *stage,
            Self::TaskNotFound(_) => Stage::Aggregation,
        }
    }
}
