//! Core data model.
//!
//! A job is a task hosted on the remote marketplace. It owns the assignments
//! workers submit against it. Both records carry a lifecycle state driven by a
//! transition table (see [`crate::machine`]).

pub mod assignment;
pub mod job;

pub use assignment::{
    ASSIGNMENT_MACHINE, Assignment, AssignmentCounts, AssignmentEvent, AssignmentId,
    AssignmentState,
};
pub use job::{
    DEFAULT_ASSIGNMENT_DURATION_SECS, DEFAULT_LIFETIME_SECS, JOB_MACHINE, Job, JobEvent, JobId,
    JobState, NewJob, PendingExtension, Qualification, QuestionKind, RequiredApproved,
};
