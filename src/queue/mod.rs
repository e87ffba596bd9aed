//! Background task queue: named work items, delivered at least once.
//!
//! Entry actions and event handling enqueue [`Task`]s; a [`crate::engine::TaskWorker`]
//! receives them later, possibly out of order, duplicated or delayed. Every
//! handler must therefore be safe to re-run.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{AssignmentId, JobId};

pub use memory::MemoryQueue;

/// A unit of background work. The serde tag is the work item name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "kebab-case")]
pub enum Task {
    /// Create the remote task, then fire `launched`.
    LaunchTask { job_id: JobId },
    /// Retire remote task resources.
    DisposeTask { remote_task_id: String },
    /// Notify downstream systems that a job finished.
    OnJobFinished { job_id: JobId },
    /// Approve one submitted assignment.
    ApproveTask { assignment_id: AssignmentId },
    /// Fetch one assignment from the marketplace and ingest it.
    PollResultsTask {
        remote_task_id: String,
        remote_assignment_id: String,
    },
    /// Ingest every remote assignment of a job, then check its progress.
    SyncJobTask { job_id: JobId },
}

impl Task {
    /// The work item name, as carried on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Task::LaunchTask { .. } => "launch-task",
            Task::DisposeTask { .. } => "dispose-task",
            Task::OnJobFinished { .. } => "on-job-finished",
            Task::ApproveTask { .. } => "approve-task",
            Task::PollResultsTask { .. } => "poll-results-task",
            Task::SyncJobTask { .. } => "sync-job-task",
        }
    }
}

/// A task handed to a worker. Unacknowledged deliveries come back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: i64,
    /// Times this task has been handed out, including this one.
    pub read_count: i32,
    pub task: Task,
}

/// Queue transport seam.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Fire-and-forget enqueue.
    async fn enqueue(&self, task: &Task) -> Result<()>;

    /// Next available delivery, or `None` when the queue is empty.
    async fn receive(&self) -> Result<Option<Delivery>>;

    /// The delivery was handled (or dead-lettered). Do not redeliver.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Hand the delivery back for another attempt.
    async fn retry(&self, delivery: Delivery) -> Result<()>;
}
