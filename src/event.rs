//! Structured events emitted by the engine on every state transition.
//!
//! Consumers subscribe to the event stream to build dashboards,
//! alerting, or audit logs. Events are the engine's voice;
//! task-scoped logs are the worker's voice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{AssignmentEvent, AssignmentId, AssignmentState, JobEvent, JobId, JobState};

/// A structured event emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number. Consumers can detect gaps.
    pub seq: u64,
    /// When this event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    JobCreated {
        id: JobId,
        job_type: String,
        target_assignment_count: u32,
        required_approved_count: u32,
    },
    JobTransition {
        id: JobId,
        event: JobEvent,
        from: JobState,
        to: JobState,
    },
    JobExtended {
        id: JobId,
        assignments: u32,
        target_assignment_count: u32,
    },
    JobFinished {
        id: JobId,
        approved: u32,
        rejected: u32,
    },
    AssignmentIngested {
        id: AssignmentId,
        job_id: JobId,
        remote_assignment_id: String,
        worker_id: String,
    },
    AssignmentTransition {
        id: AssignmentId,
        job_id: JobId,
        event: AssignmentEvent,
        from: AssignmentState,
        to: AssignmentState,
    },
}
