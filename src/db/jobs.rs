//! Job rows: insert, lookup and versioned compare-and-set.

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Job, JobId, JobState};

const JOB_COLUMNS: &str = "id, job_type, remote_task_id, remote_type_id, remote_url, title, description, question_kind, question, keywords, reward_cents, target_assignment_count, required_approved_count, lifetime_secs, assignment_duration_secs, qualifications, state, pending_extension, version, created_at, updated_at, finished_at";

impl super::Db {
    pub(crate) async fn insert_job_row(&self, job: &Job) -> Result<()> {
        sqlx::query(
            "INSERT INTO jobs (id, job_type, remote_task_id, remote_type_id, remote_url, title, description, question_kind, question, keywords, reward_cents, target_assignment_count, required_approved_count, lifetime_secs, assignment_duration_secs, qualifications, state, pending_extension, version, created_at, updated_at, finished_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)",
        )
        .bind(job.id.0)
        .bind(&job.job_type)
        .bind(&job.remote_task_id)
        .bind(&job.remote_type_id)
        .bind(&job.remote_url)
        .bind(&job.title)
        .bind(&job.description)
        .bind(job.question_kind.to_string())
        .bind(&job.question)
        .bind(&job.keywords)
        .bind(i64::from(job.reward_cents))
        .bind(i64::from(job.target_assignment_count))
        .bind(i64::from(job.required_approved_count))
        .bind(job.lifetime_secs as i64)
        .bind(job.assignment_duration_secs as i64)
        .bind(serde_json::to_value(&job.qualifications)?)
        .bind(job.state.to_string())
        .bind(pending_extension_value(job)?)
        .bind(job.version)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.finished_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub(crate) async fn get_job_row(&self, id: JobId) -> Result<Job> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(self.pool())
                .await?;

        row.ok_or_else(|| Error::NotFound(format!("job {id}")))?
            .try_into_job()
    }

    pub(crate) async fn find_job_row_by_remote_task(
        &self,
        remote_task_id: &str,
    ) -> Result<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE remote_task_id = $1"
        ))
        .bind(remote_task_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(JobRow::try_into_job).transpose()
    }

    pub(crate) async fn list_job_rows(
        &self,
        state: Option<JobState>,
        limit: i64,
    ) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE ($1::text IS NULL OR state = $1)
             ORDER BY created_at DESC
             LIMIT $2"
        ))
        .bind(state.map(|s| s.to_string()))
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(JobRow::try_into_job).collect()
    }

    /// Optimistic concurrency: the update only lands while `version` is unchanged.
    pub(crate) async fn swap_job_row(&self, expected_version: i64, job: &Job) -> Result<Job> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "UPDATE jobs SET remote_task_id = $1, remote_type_id = $2, remote_url = $3, title = $4, description = $5,
                question_kind = $6, question = $7, keywords = $8, reward_cents = $9, target_assignment_count = $10,
                required_approved_count = $11, lifetime_secs = $12, assignment_duration_secs = $13, qualifications = $14,
                state = $15, finished_at = $16, pending_extension = $17, version = version + 1, updated_at = now()
             WHERE id = $18 AND version = $19
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(&job.remote_task_id)
        .bind(&job.remote_type_id)
        .bind(&job.remote_url)
        .bind(&job.title)
        .bind(&job.description)
        .bind(job.question_kind.to_string())
        .bind(&job.question)
        .bind(&job.keywords)
        .bind(i64::from(job.reward_cents))
        .bind(i64::from(job.target_assignment_count))
        .bind(i64::from(job.required_approved_count))
        .bind(job.lifetime_secs as i64)
        .bind(job.assignment_duration_secs as i64)
        .bind(serde_json::to_value(&job.qualifications)?)
        .bind(job.state.to_string())
        .bind(job.finished_at)
        .bind(pending_extension_value(job)?)
        .bind(job.id.0)
        .bind(expected_version)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => row.try_into_job(),
            None => {
                // Distinguish a lost race from a missing record.
                let current = self.get_job_row(job.id).await?;
                Err(Error::Conflict(format!(
                    "job {} is at version {}, expected {expected_version}",
                    job.id, current.version
                )))
            }
        }
    }

    pub(crate) async fn delete_job_row(&self, id: JobId) -> Result<()> {
        let rows_affected = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id.0)
            .execute(self.pool())
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(Error::NotFound(format!("job {id}")));
        }
        Ok(())
    }
}

fn pending_extension_value(job: &Job) -> Result<Option<serde_json::Value>> {
    job.pending_extension
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(Error::from)
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    job_type: String,
    remote_task_id: Option<String>,
    remote_type_id: Option<String>,
    remote_url: Option<String>,
    title: String,
    description: String,
    question_kind: String,
    question: serde_json::Value,
    keywords: Vec<String>,
    reward_cents: i64,
    target_assignment_count: i64,
    required_approved_count: i64,
    lifetime_secs: i64,
    assignment_duration_secs: i64,
    qualifications: serde_json::Value,
    state: String,
    pending_extension: Option<serde_json::Value>,
    version: i64,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl JobRow {
    fn try_into_job(self) -> Result<Job> {
        Ok(Job {
            id: JobId(self.id),
            job_type: self.job_type,
            remote_task_id: self.remote_task_id,
            remote_type_id: self.remote_type_id,
            remote_url: self.remote_url,
            title: self.title,
            description: self.description,
            question_kind: self.question_kind.parse()?,
            question: self.question,
            keywords: self.keywords,
            reward_cents: self.reward_cents as u32,
            target_assignment_count: self.target_assignment_count as u32,
            required_approved_count: self.required_approved_count as u32,
            lifetime_secs: self.lifetime_secs as u64,
            assignment_duration_secs: self.assignment_duration_secs as u64,
            qualifications: serde_json::from_value(self.qualifications)?,
            state: self.state.parse()?,
            pending_extension: self
                .pending_extension
                .map(serde_json::from_value)
                .transpose()?,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            finished_at: self.finished_at,
        })
    }
}
