//! In-memory record store for tests and embedding.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{Ingested, RecordStore};
use crate::error::{Error, Result};
use crate::model::{
    Assignment, AssignmentCounts, AssignmentId, AssignmentState, Job, JobId, JobState,
};

/// Records kept in insertion order, which is also creation order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: RwLock<Vec<Job>>,
    assignments: RwLock<Vec<Assignment>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_job(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.iter().any(|j| j.id == job.id) {
            return Err(Error::Conflict(format!("job {} already exists", job.id)));
        }
        jobs.push(job.clone());
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Job> {
        self.jobs
            .read()
            .await
            .iter()
            .find(|j| j.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("job {id}")))
    }

    async fn find_job_by_remote_task(&self, remote_task_id: &str) -> Result<Option<Job>> {
        Ok(self
            .jobs
            .read()
            .await
            .iter()
            .find(|j| j.remote_task_id.as_deref() == Some(remote_task_id))
            .cloned())
    }

    async fn list_jobs(&self, state: Option<JobState>, limit: i64) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .iter()
            .rev()
            .filter(|j| state.is_none_or(|s| j.state == s))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn compare_and_swap_job(&self, expected_version: i64, job: &Job) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs
            .iter_mut()
            .find(|j| j.id == job.id)
            .ok_or_else(|| Error::NotFound(format!("job {}", job.id)))?;
        if stored.version != expected_version {
            return Err(Error::Conflict(format!(
                "job {} is at version {}, expected {expected_version}",
                job.id, stored.version
            )));
        }

        let created_at = stored.created_at;
        let job_type = stored.job_type.clone();
        *stored = job.clone();
        stored.job_type = job_type;
        stored.created_at = created_at;
        stored.version = expected_version + 1;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete_job(&self, id: JobId) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        if jobs.len() == before {
            return Err(Error::NotFound(format!("job {id}")));
        }
        self.assignments.write().await.retain(|a| a.job_id != id);
        Ok(())
    }

    async fn insert_assignment_if_absent(&self, assignment: &Assignment) -> Result<Ingested> {
        let mut assignments = self.assignments.write().await;
        if let Some(existing) = assignments.iter().find(|a| {
            a.job_id == assignment.job_id
                && a.remote_assignment_id == assignment.remote_assignment_id
        }) {
            return Ok(Ingested::Existing(existing.clone()));
        }
        assignments.push(assignment.clone());
        Ok(Ingested::Created(assignment.clone()))
    }

    async fn get_assignment(&self, id: AssignmentId) -> Result<Assignment> {
        self.assignments
            .read()
            .await
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("assignment {id}")))
    }

    async fn list_assignments(&self, job_id: JobId) -> Result<Vec<Assignment>> {
        Ok(self
            .assignments
            .read()
            .await
            .iter()
            .filter(|a| a.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn transition_assignment(
        &self,
        id: AssignmentId,
        from: AssignmentState,
        to: AssignmentState,
        feedback: Option<&str>,
    ) -> Result<Option<Assignment>> {
        let mut assignments = self.assignments.write().await;
        let stored = assignments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::NotFound(format!("assignment {id}")))?;
        if stored.state != from {
            return Ok(None);
        }
        let now = Utc::now();
        stored.state = to;
        stored.updated_at = now;
        if to.is_terminal() {
            stored.decided_at = Some(now);
        }
        if let Some(feedback) = feedback {
            stored.feedback = Some(feedback.to_string());
        }
        Ok(Some(stored.clone()))
    }

    async fn assignment_counts(&self, job_id: JobId) -> Result<AssignmentCounts> {
        Ok(self
            .assignments
            .read()
            .await
            .iter()
            .filter(|a| a.job_id == job_id)
            .collect())
    }
}
