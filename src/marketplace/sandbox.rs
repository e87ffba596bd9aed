//! In-process marketplace.
//!
//! Holds tasks and assignments in memory and lets callers play the worker via
//! [`SandboxMarketplace::submit`]. Used by tests and by fake-submit deployments.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    CreateTaskRequest, ExtendRequest, MarketplaceClient, MarketplaceError, MarketplaceResult,
    RemoteAssignment, RemoteAssignmentStatus, RemoteTask, RemoteTaskStatus,
};

#[derive(Debug, Clone)]
struct SandboxTask {
    task: RemoteTask,
    assignments: Vec<RemoteAssignment>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    tasks: HashMap<String, SandboxTask>,
    tokens: HashMap<String, String>,
    created: u32,
    extensions: Vec<(String, ExtendRequest)>,
    extension_tokens: HashSet<String>,
    unavailable: bool,
}

impl Inner {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{:06}", self.next_id)
    }

    fn check_available(&self) -> MarketplaceResult<()> {
        if self.unavailable {
            Err(MarketplaceError::Request("sandbox marketplace unavailable".into()))
        } else {
            Ok(())
        }
    }

    fn task_mut(&mut self, task_id: &str) -> MarketplaceResult<&mut SandboxTask> {
        self.tasks
            .get_mut(task_id)
            .ok_or_else(|| MarketplaceError::NotFound(format!("task {task_id}")))
    }

    fn assignment_mut(&mut self, assignment_id: &str) -> MarketplaceResult<&mut RemoteAssignment> {
        self.tasks
            .values_mut()
            .flat_map(|t| t.assignments.iter_mut())
            .find(|a| a.id == assignment_id)
            .ok_or_else(|| MarketplaceError::NotFound(format!("assignment {assignment_id}")))
    }

    fn decide(
        &mut self,
        assignment_id: &str,
        to: RemoteAssignmentStatus,
    ) -> MarketplaceResult<()> {
        self.check_available()?;
        let assignment = self.assignment_mut(assignment_id)?;
        match assignment.status {
            RemoteAssignmentStatus::Submitted => {
                assignment.status = to;
                Ok(())
            }
            current if current == to => Ok(()),
            current => Err(MarketplaceError::InvalidState(format!(
                "assignment {assignment_id} is already {current:?}"
            ))),
        }
    }
}

/// A marketplace that lives in this process.
#[derive(Debug, Default)]
pub struct SandboxMarketplace {
    inner: Mutex<Inner>,
}

impl SandboxMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a request error until switched back.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().await.unavailable = unavailable;
    }

    /// Play a worker: submit answers against an assignable task.
    pub async fn submit(
        &self,
        task_id: &str,
        worker_id: &str,
        answers: serde_json::Value,
    ) -> MarketplaceResult<RemoteAssignment> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        let id = inner.next("A");
        let entry = inner.task_mut(task_id)?;
        if entry.task.status != RemoteTaskStatus::Assignable {
            return Err(MarketplaceError::InvalidState(format!(
                "task {task_id} is not assignable"
            )));
        }
        let assignment = RemoteAssignment {
            id,
            task_id: task_id.to_string(),
            worker_id: worker_id.to_string(),
            status: RemoteAssignmentStatus::Submitted,
            answers,
        };
        entry.assignments.push(assignment.clone());
        if entry.assignments.len() as u32 >= entry.task.max_assignments {
            entry.task.status = RemoteTaskStatus::Reviewable;
        }
        Ok(assignment)
    }

    /// Remote tasks created so far, counting deduplicated requests once.
    pub async fn created_count(&self) -> u32 {
        self.inner.lock().await.created
    }

    /// Extensions granted, in order. Repeated tokens are not listed again.
    pub async fn extensions(&self) -> Vec<(String, ExtendRequest)> {
        self.inner.lock().await.extensions.clone()
    }

    pub async fn assignment_status(&self, assignment_id: &str) -> Option<RemoteAssignmentStatus> {
        let mut inner = self.inner.lock().await;
        inner.assignment_mut(assignment_id).ok().map(|a| a.status)
    }
}

#[async_trait]
impl MarketplaceClient for SandboxMarketplace {
    async fn find_task(&self, task_id: &str) -> MarketplaceResult<RemoteTask> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        Ok(inner.task_mut(task_id)?.task.clone())
    }

    async fn create_task(&self, request: &CreateTaskRequest) -> MarketplaceResult<RemoteTask> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        if let Some(existing) = inner.tokens.get(&request.request_token).cloned() {
            return Ok(inner.task_mut(&existing)?.task.clone());
        }

        let id = inner.next("T");
        let task = RemoteTask {
            url: Some(format!("sandbox://tasks/{id}")),
            type_id: format!("type-{}", request.reward_cents),
            id: id.clone(),
            status: RemoteTaskStatus::Assignable,
            max_assignments: request.max_assignments,
        };
        inner.tokens.insert(request.request_token.clone(), id.clone());
        inner.tasks.insert(
            id,
            SandboxTask {
                task: task.clone(),
                assignments: Vec::new(),
            },
        );
        inner.created += 1;
        Ok(task)
    }

    async fn expire_task(&self, task_id: &str) -> MarketplaceResult<()> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        let entry = inner.task_mut(task_id)?;
        if !entry.task.status.is_open() {
            return Err(MarketplaceError::InvalidState(format!(
                "task {task_id} is not open"
            )));
        }
        entry.task.status = RemoteTaskStatus::Reviewable;
        Ok(())
    }

    async fn dispose_task(&self, task_id: &str) -> MarketplaceResult<()> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        let entry = inner.task_mut(task_id)?;
        if entry.task.status.is_open() {
            return Err(MarketplaceError::InvalidState(format!(
                "task {task_id} must be expired before disposal"
            )));
        }
        inner.tasks.remove(task_id);
        Ok(())
    }

    async fn extend_task(
        &self,
        task_id: &str,
        request_token: &str,
        request: ExtendRequest,
    ) -> MarketplaceResult<()> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        if inner.extension_tokens.contains(request_token) {
            return Ok(());
        }
        let entry = inner.task_mut(task_id)?;
        if let Some(extra) = request.assignments {
            entry.task.max_assignments += extra;
        }
        if (entry.assignments.len() as u32) < entry.task.max_assignments
            || request.seconds.is_some()
        {
            entry.task.status = RemoteTaskStatus::Assignable;
        }
        inner.extension_tokens.insert(request_token.to_string());
        inner.extensions.push((task_id.to_string(), request));
        Ok(())
    }

    async fn list_assignments(&self, task_id: &str) -> MarketplaceResult<Vec<RemoteAssignment>> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        Ok(inner.task_mut(task_id)?.assignments.clone())
    }

    async fn approve_assignment(
        &self,
        assignment_id: &str,
        _feedback: Option<&str>,
    ) -> MarketplaceResult<()> {
        self.inner
            .lock()
            .await
            .decide(assignment_id, RemoteAssignmentStatus::Approved)
    }

    async fn reject_assignment(
        &self,
        assignment_id: &str,
        _feedback: Option<&str>,
    ) -> MarketplaceResult<()> {
        self.inner
            .lock()
            .await
            .decide(assignment_id, RemoteAssignmentStatus::Rejected)
    }
}
