//! Record store seam.
//!
//! Jobs and assignments are the shared mutable records. Every job write is a
//! compare-and-set on `version`; every assignment decision is a
//! compare-and-set on `state`. Losing writers see [`Error::Conflict`] (jobs)
//! or `None` (assignments) and must re-read before deciding again.
//!
//! [`Error::Conflict`]: crate::error::Error::Conflict

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Assignment, AssignmentCounts, AssignmentId, AssignmentState, Job, JobId, JobState};

pub use memory::MemoryStore;

/// Outcome of idempotent assignment ingestion.
#[derive(Debug, Clone)]
pub enum Ingested {
    /// First time this `remote_assignment_id` was seen for the job.
    Created(Assignment),
    /// Already known. The stored record is returned untouched.
    Existing(Assignment),
}

impl Ingested {
    pub fn assignment(&self) -> &Assignment {
        match self {
            Ingested::Created(a) | Ingested::Existing(a) => a,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Ingested::Created(_))
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_job(&self, job: &Job) -> Result<()>;

    async fn get_job(&self, id: JobId) -> Result<Job>;

    async fn find_job_by_remote_task(&self, remote_task_id: &str) -> Result<Option<Job>>;

    /// Newest first.
    async fn list_jobs(&self, state: Option<JobState>, limit: i64) -> Result<Vec<Job>>;

    /// Write the mutable fields of `job` if the stored version still equals
    /// `expected_version`. Returns the stored record with its new version.
    async fn compare_and_swap_job(&self, expected_version: i64, job: &Job) -> Result<Job>;

    /// Remove a job and every assignment it owns.
    async fn delete_job(&self, id: JobId) -> Result<()>;

    /// Insert unless `(job_id, remote_assignment_id)` already exists.
    async fn insert_assignment_if_absent(&self, assignment: &Assignment) -> Result<Ingested>;

    async fn get_assignment(&self, id: AssignmentId) -> Result<Assignment>;

    /// Oldest first.
    async fn list_assignments(&self, job_id: JobId) -> Result<Vec<Assignment>>;

    /// Move an assignment `from -> to` if it is still in `from`. `None` when
    /// another writer got there first.
    async fn transition_assignment(
        &self,
        id: AssignmentId,
        from: AssignmentState,
        to: AssignmentState,
        feedback: Option<&str>,
    ) -> Result<Option<Assignment>>;

    async fn assignment_counts(&self, job_id: JobId) -> Result<AssignmentCounts>;
}
