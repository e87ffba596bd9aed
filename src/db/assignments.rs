//! Assignment rows: idempotent ingestion and state compare-and-set.

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Assignment, AssignmentCounts, AssignmentId, AssignmentState, JobId};
use crate::store::Ingested;

const ASSIGNMENT_COLUMNS: &str = "id, job_id, remote_assignment_id, worker_id, answers, state, feedback, created_at, updated_at, decided_at";

impl super::Db {
    pub(crate) async fn insert_assignment_row(&self, assignment: &Assignment) -> Result<Ingested> {
        // The unique (job_id, remote_assignment_id) constraint makes
        // re-ingestion a no-op even when two ingesters race.
        let inserted: Option<AssignmentRow> = sqlx::query_as(&format!(
            "INSERT INTO assignments ({ASSIGNMENT_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (job_id, remote_assignment_id) DO NOTHING
             RETURNING {ASSIGNMENT_COLUMNS}"
        ))
        .bind(assignment.id.0)
        .bind(assignment.job_id.0)
        .bind(&assignment.remote_assignment_id)
        .bind(&assignment.worker_id)
        .bind(&assignment.answers)
        .bind(assignment.state.to_string())
        .bind(&assignment.feedback)
        .bind(assignment.created_at)
        .bind(assignment.updated_at)
        .bind(assignment.decided_at)
        .fetch_optional(self.pool())
        .await?;

        if let Some(row) = inserted {
            return Ok(Ingested::Created(row.try_into_assignment()?));
        }

        let existing: AssignmentRow = sqlx::query_as(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments
             WHERE job_id = $1 AND remote_assignment_id = $2"
        ))
        .bind(assignment.job_id.0)
        .bind(&assignment.remote_assignment_id)
        .fetch_one(self.pool())
        .await?;
        Ok(Ingested::Existing(existing.try_into_assignment()?))
    }

    pub(crate) async fn get_assignment_row(&self, id: AssignmentId) -> Result<Assignment> {
        let row: Option<AssignmentRow> = sqlx::query_as(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(self.pool())
        .await?;

        row.ok_or_else(|| Error::NotFound(format!("assignment {id}")))?
            .try_into_assignment()
    }

    pub(crate) async fn list_assignment_rows(&self, job_id: JobId) -> Result<Vec<Assignment>> {
        let rows: Vec<AssignmentRow> = sqlx::query_as(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE job_id = $1 ORDER BY created_at ASC"
        ))
        .bind(job_id.0)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(AssignmentRow::try_into_assignment)
            .collect()
    }

    pub(crate) async fn transition_assignment_row(
        &self,
        id: AssignmentId,
        from: AssignmentState,
        to: AssignmentState,
        feedback: Option<&str>,
    ) -> Result<Option<Assignment>> {
        let decided_at = to.is_terminal().then(chrono::Utc::now);

        let row: Option<AssignmentRow> = sqlx::query_as(&format!(
            "UPDATE assignments SET state = $1, updated_at = now(),
                decided_at = COALESCE($2, decided_at), feedback = COALESCE($3, feedback)
             WHERE id = $4 AND state = $5
             RETURNING {ASSIGNMENT_COLUMNS}"
        ))
        .bind(to.to_string())
        .bind(decided_at)
        .bind(feedback)
        .bind(id.0)
        .bind(from.to_string())
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => row.try_into_assignment().map(Some),
            None => {
                // Missing record is an error; a moved record is a lost race.
                self.get_assignment_row(id).await?;
                Ok(None)
            }
        }
    }

    pub(crate) async fn count_assignment_rows(&self, job_id: JobId) -> Result<AssignmentCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT state, COUNT(*) FROM assignments WHERE job_id = $1 GROUP BY state",
        )
        .bind(job_id.0)
        .fetch_all(self.pool())
        .await?;

        let mut counts = AssignmentCounts::default();
        for (state, n) in rows {
            let n = n as u32;
            match state.parse()? {
                AssignmentState::Submitted => counts.submitted = n,
                AssignmentState::Approved => counts.approved = n,
                AssignmentState::Rejected => counts.rejected = n,
                AssignmentState::Error => counts.errored = n,
            }
        }
        Ok(counts)
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct AssignmentRow {
    id: Uuid,
    job_id: Uuid,
    remote_assignment_id: String,
    worker_id: String,
    answers: serde_json::Value,
    state: String,
    feedback: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    decided_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl AssignmentRow {
    fn try_into_assignment(self) -> Result<Assignment> {
        Ok(Assignment {
            id: AssignmentId(self.id),
            job_id: JobId(self.job_id),
            remote_assignment_id: self.remote_assignment_id,
            worker_id: self.worker_id,
            answers: self.answers,
            state: self.state.parse()?,
            feedback: self.feedback,
            created_at: self.created_at,
            updated_at: self.updated_at,
            decided_at: self.decided_at,
        })
    }
}
