//! Postgres connection pool, migrations, health check and the
//! [`RecordStore`] implementation.

pub mod assignments;
pub mod jobs;
pub mod pgmq;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::Result;
use crate::model::{
    Assignment, AssignmentCounts, AssignmentId, AssignmentState, Job, JobId, JobState,
};
use crate::store::{Ingested, RecordStore};

pub use pgmq::PgmqQueue;

/// Database handle. Owns the connection pool shared by the store and the queue.
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| crate::error::Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for Db {
    async fn insert_job(&self, job: &Job) -> Result<()> {
        self.insert_job_row(job).await
    }

    async fn get_job(&self, id: JobId) -> Result<Job> {
        self.get_job_row(id).await
    }

    async fn find_job_by_remote_task(&self, remote_task_id: &str) -> Result<Option<Job>> {
        self.find_job_row_by_remote_task(remote_task_id).await
    }

    async fn list_jobs(&self, state: Option<JobState>, limit: i64) -> Result<Vec<Job>> {
        self.list_job_rows(state, limit).await
    }

    async fn compare_and_swap_job(&self, expected_version: i64, job: &Job) -> Result<Job> {
        self.swap_job_row(expected_version, job).await
    }

    async fn delete_job(&self, id: JobId) -> Result<()> {
        self.delete_job_row(id).await
    }

    async fn insert_assignment_if_absent(&self, assignment: &Assignment) -> Result<Ingested> {
        self.insert_assignment_row(assignment).await
    }

    async fn get_assignment(&self, id: AssignmentId) -> Result<Assignment> {
        self.get_assignment_row(id).await
    }

    async fn list_assignments(&self, job_id: JobId) -> Result<Vec<Assignment>> {
        self.list_assignment_rows(job_id).await
    }

    async fn transition_assignment(
        &self,
        id: AssignmentId,
        from: AssignmentState,
        to: AssignmentState,
        feedback: Option<&str>,
    ) -> Result<Option<Assignment>> {
        self.transition_assignment_row(id, from, to, feedback).await
    }

    async fn assignment_counts(&self, job_id: JobId) -> Result<AssignmentCounts> {
        self.count_assignment_rows(job_id).await
    }
}
