//! Command-line surface: task initiation, manual passes and document routing.
//!
//! Portal capture needs a browser driver and runs from library code through
//! `TaskRunner::run_task`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;

use crate::config::{self, PipelineConfig, StorageConfig};
use crate::db::sqlite::open_database;
use crate::db::DatabaseError;
use crate::models::{ProcessingStatus, QueueCounts, StagingStats};
use crate::pipeline::aggregate;
use crate::pipeline::queue::{GuideQueue, QueueError};
use crate::pipeline::reconcile::Reconciler;
use crate::pipeline::routing::{storage_from_config, BatchSummary, DocumentRouter, RoutingError, SidecarExtractor};
use crate::pipeline::staging::{SqliteStagingStore, StagingError, StagingStore};
use crate::pipeline::tasks;
use crate::pipeline::worker::{run_pass, start_worker};
use crate::pipeline::PipelineError;

/// Staged capture and reconciliation of billing guides.
#[derive(Debug, Parser)]
#[command(name = "guias-sync", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// SQLite database file. Defaults to `GUIAS_DB_PATH` or ~/.guias-sync/guias.db.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a task row and print its id.
    InitTask {
        /// Expected number of guides, if known.
        #[arg(long)]
        total: Option<u32>,
    },

    /// Promote pending staged sessions into the execution ledger.
    Reconcile {
        /// Only rows of this task.
        #[arg(long)]
        task: Option<String>,
    },

    /// Recompute a task's status snapshot.
    Refresh { task: String },

    /// Send a task's errored rows back to pending.
    Requeue { task: String },

    /// Show a task's snapshot with live staging and queue counts.
    Status { task: String },

    /// Run the background reconciliation worker.
    Worker {
        /// Run a single pass and exit.
        #[arg(long, default_value_t = false)]
        once: bool,
    },

    /// Route scanned documents. Fields are read from `<file>.json`.
    Route {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("Cannot render output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("{failed} of {total} documents failed to route")]
    RoutingFailures { failed: u32, total: usize },
}

#[derive(Serialize)]
struct StatusView {
    task: ProcessingStatus,
    staging: StagingStats,
    queue: QueueCounts,
}

#[derive(Serialize)]
struct RequeueView<'a> {
    task_id: &'a str,
    requeued: u32,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Execute a parsed command.
pub fn run(cli: Cli) -> Result<(), CliError> {
    let db_path = cli.db.unwrap_or_else(config::database_path);
    let pipeline = PipelineConfig::from_env();
    let store = SqliteStagingStore::new();

    match cli.command {
        Command::InitTask { total } => {
            let conn = open_database(&db_path)?;
            print_json(&tasks::create_task(&conn, total)?)
        }
        Command::Reconcile { task } => {
            let conn = open_database(&db_path)?;
            let reconciler = Reconciler::new(Box::new(store), pipeline.reconcile_batch_size);
            let report = reconciler.reconcile_task(&conn, task.as_deref())?;
            aggregate::refresh(&conn, &store, task.as_deref())?;
            print_json(&report)
        }
        Command::Refresh { task } => {
            let conn = open_database(&db_path)?;
            let snapshot = aggregate::refresh(&conn, &store, Some(&task))?
                .ok_or_else(|| PipelineError::TaskNotFound(task.clone()))?;
            print_json(&snapshot)
        }
        Command::Requeue { task } => {
            let conn = open_database(&db_path)?;
            let requeued = store.requeue_errors(&conn, &task)?;
            aggregate::refresh(&conn, &store, Some(&task))?;
            print_json(&RequeueView {
                task_id: &task,
                requeued,
            })
        }
        Command::Status { task } => {
            let conn = open_database(&db_path)?;
            let snapshot = tasks::get_task(&conn, &task)?
                .ok_or_else(|| PipelineError::TaskNotFound(task.clone()))?;
            let queue = GuideQueue::new(pipeline.max_queue_attempts);
            print_json(&StatusView {
                staging: store.stats(&conn, &task)?,
                queue: queue.counts(&conn, &task)?,
                task: snapshot,
            })
        }
        Command::Worker { once } => {
            if once {
                let conn = open_database(&db_path)?;
                return print_json(&run_pass(&conn, &pipeline)?);
            }
            let handle = start_worker(db_path, pipeline);
            while !handle.is_finished() {
                std::thread::sleep(Duration::from_secs(1));
            }
            Ok(())
        }
        Command::Route { files } => {
            let conn = open_database(&db_path)?;
            let storage = storage_from_config(&StorageConfig::from_env())?;
            let router = DocumentRouter::new(Box::new(SidecarExtractor::new()), storage);
            let outcomes = router.route_batch(&conn, &files);
            print_json(&outcomes)?;

            let summary = BatchSummary::from_outcomes(&outcomes);
            if summary.error > 0 {
                return Err(CliError::RoutingFailures {
                    failed: summary.error,
                    total: outcomes.len(),
                });
            }
            Ok(())
        }
    }
}
