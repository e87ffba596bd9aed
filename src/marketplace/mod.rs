//! Remote task marketplace seam.
//!
//! The engine only needs the operations below. Every operation that addresses
//! a remote task or assignment fails with [`MarketplaceError::NotFound`] when
//! it no longer exists.

pub mod sandbox;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::model::{Job, Qualification, QuestionKind};

pub use sandbox::SandboxMarketplace;

#[derive(Debug, Clone, Error)]
pub enum MarketplaceError {
    #[error("remote record not found: {0}")]
    NotFound(String),

    /// The remote record cannot take this operation in its current status.
    #[error("rejected by marketplace: {0}")]
    InvalidState(String),

    #[error("marketplace request failed: {0}")]
    Request(String),
}

impl MarketplaceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, MarketplaceError::NotFound(_))
    }

    /// The request may not have reached the marketplace; repeating it can
    /// succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, MarketplaceError::Request(_))
    }
}

pub type MarketplaceResult<T> = std::result::Result<T, MarketplaceError>;

/// Remote task status as reported by the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteTaskStatus {
    Assignable,
    Unassignable,
    Reviewable,
    Reviewing,
    Disposed,
}

impl RemoteTaskStatus {
    /// Still visible to workers (or held by one) and so must be expired first.
    pub fn is_open(self) -> bool {
        matches!(
            self,
            RemoteTaskStatus::Assignable | RemoteTaskStatus::Unassignable
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTask {
    pub id: String,
    pub type_id: String,
    pub url: Option<String>,
    pub status: RemoteTaskStatus,
    pub max_assignments: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteAssignmentStatus {
    Submitted,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteAssignment {
    pub id: String,
    pub task_id: String,
    pub worker_id: String,
    pub status: RemoteAssignmentStatus,
    pub answers: serde_json::Value,
}

/// Everything needed to post a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    /// Deduplicates repeated creation attempts for the same job.
    pub request_token: String,
    pub title: String,
    pub description: String,
    pub question_kind: QuestionKind,
    pub question: serde_json::Value,
    pub keywords: Vec<String>,
    pub reward_cents: u32,
    pub max_assignments: u32,
    pub lifetime_secs: u64,
    pub assignment_duration_secs: u64,
    pub qualifications: Vec<Qualification>,
}

impl From<&Job> for CreateTaskRequest {
    fn from(job: &Job) -> Self {
        Self {
            request_token: job.id.to_string(),
            title: job.title.clone(),
            description: job.description.clone(),
            question_kind: job.question_kind,
            question: job.question.clone(),
            keywords: job.keywords.clone(),
            reward_cents: job.reward_cents,
            max_assignments: job.target_assignment_count,
            lifetime_secs: job.lifetime_secs,
            assignment_duration_secs: job.assignment_duration_secs,
            qualifications: job.qualifications.clone(),
        }
    }
}

/// Extension options. Unset fields are left alone by the marketplace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendRequest {
    /// Extra assignment slots to grant.
    pub assignments: Option<u32>,
    /// Extra lifetime, counted from now if the task already expired.
    pub seconds: Option<u64>,
}

#[async_trait]
pub trait MarketplaceClient: Send + Sync {
    async fn find_task(&self, task_id: &str) -> MarketplaceResult<RemoteTask>;

    async fn create_task(&self, request: &CreateTaskRequest) -> MarketplaceResult<RemoteTask>;

    async fn expire_task(&self, task_id: &str) -> MarketplaceResult<()>;

    async fn dispose_task(&self, task_id: &str) -> MarketplaceResult<()>;

    /// Grant more slots or lifetime. A repeated `request_token` is a no-op.
    async fn extend_task(
        &self,
        task_id: &str,
        request_token: &str,
        request: ExtendRequest,
    ) -> MarketplaceResult<()>;

    async fn list_assignments(&self, task_id: &str) -> MarketplaceResult<Vec<RemoteAssignment>>;

    async fn approve_assignment(
        &self,
        assignment_id: &str,
        feedback: Option<&str>,
    ) -> MarketplaceResult<()>;

    async fn reject_assignment(
        &self,
        assignment_id: &str,
        feedback: Option<&str>,
    ) -> MarketplaceResult<()>;
}

/// Marketplace client selected by configuration.
///
/// Only the sandbox ships with this crate; a production client is plugged in
/// by constructing [`crate::engine::Engine`] directly.
pub fn from_config(config: &Config) -> crate::error::Result<Arc<dyn MarketplaceClient>> {
    if config.fake_submit {
        Ok(Arc::new(SandboxMarketplace::new()))
    } else {
        Err(crate::error::Error::Config(
            "no marketplace client configured; set CROWDQ_FAKE_SUBMIT=true for the sandbox"
                .to_string(),
        ))
    }
}
