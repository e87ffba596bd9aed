//! Assignments: one worker's response to a job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::JobId;
use crate::error::Error;
use crate::machine::{StateMachine, Transition};
use crate::queue::Task;

/// A worker response, keyed by `remote_assignment_id` within its job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    /// Owning job (lookup only).
    pub job_id: JobId,
    pub remote_assignment_id: String,
    pub worker_id: String,
    /// Raw answers as submitted. Opaque key/value mapping.
    pub answers: serde_json::Value,
    pub state: AssignmentState,
    /// Requester feedback recorded with an approval or rejection.
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl Assignment {
    /// A freshly ingested record, placed directly in `submitted`.
    pub fn submitted(
        job_id: JobId,
        remote_assignment_id: impl Into<String>,
        worker_id: impl Into<String>,
        answers: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: AssignmentId::new(),
            job_id,
            remote_assignment_id: remote_assignment_id.into(),
            worker_id: worker_id.into(),
            answers,
            state: AssignmentState::Submitted,
            feedback: None,
            created_at: now,
            updated_at: now,
            decided_at: None,
        }
    }
}

/// Newtype for assignment IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssignmentId(pub Uuid);

impl AssignmentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for AssignmentId {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle state of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentState {
    /// Answers received, awaiting a decision.
    Submitted,
    Approved,
    Rejected,
    /// Could not be processed. Terminal.
    Error,
}

impl AssignmentState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AssignmentState::Submitted)
    }
}

impl std::fmt::Display for AssignmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AssignmentState::Submitted => "submitted",
            AssignmentState::Approved => "approved",
            AssignmentState::Rejected => "rejected",
            AssignmentState::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AssignmentState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(AssignmentState::Submitted),
            "approved" => Ok(AssignmentState::Approved),
            "rejected" => Ok(AssignmentState::Rejected),
            "error" => Ok(AssignmentState::Error),
            other => Err(Error::Other(format!("unknown assignment state: {other}"))),
        }
    }
}

/// Events accepted by the assignment machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentEvent {
    Approve,
    Reject,
    Fail,
}

impl std::fmt::Display for AssignmentEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AssignmentEvent::Approve => "approve",
            AssignmentEvent::Reject => "reject",
            AssignmentEvent::Fail => "error",
        };
        write!(f, "{s}")
    }
}

/// The assignment lifecycle. Every decision leaves `submitted` for good.
pub static ASSIGNMENT_MACHINE: StateMachine<AssignmentState, AssignmentEvent, Assignment, Task> =
    StateMachine {
        name: "assignment",
        transitions: &[
            Transition {
                event: AssignmentEvent::Approve,
                from: &[AssignmentState::Submitted],
                to: AssignmentState::Approved,
                guard: None,
            },
            Transition {
                event: AssignmentEvent::Reject,
                from: &[AssignmentState::Submitted],
                to: AssignmentState::Rejected,
                guard: None,
            },
            Transition {
                event: AssignmentEvent::Fail,
                from: &[AssignmentState::Submitted],
                to: AssignmentState::Error,
                guard: None,
            },
        ],
        entry_actions: &[],
    };

/// Per-state assignment totals for one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentCounts {
    pub submitted: u32,
    pub approved: u32,
    pub rejected: u32,
    pub errored: u32,
}

impl AssignmentCounts {
    pub fn record(&mut self, state: AssignmentState) {
        match state {
            AssignmentState::Submitted => self.submitted += 1,
            AssignmentState::Approved => self.approved += 1,
            AssignmentState::Rejected => self.rejected += 1,
            AssignmentState::Error => self.errored += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.submitted + self.approved + self.rejected + self.errored
    }
}

impl<'a> FromIterator<&'a Assignment> for AssignmentCounts {
    fn from_iter<I: IntoIterator<Item = &'a Assignment>>(iter: I) -> Self {
        let mut counts = AssignmentCounts::default();
        for assignment in iter {
            counts.record(assignment.state);
        }
        counts
    }
}
