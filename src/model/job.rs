//! Jobs: one task hosted on the remote marketplace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::machine::{EntryAction, StateMachine, Transition};
use crate::queue::Task;

/// Default remote task lifetime: one week.
pub const DEFAULT_LIFETIME_SECS: u64 = 7 * 24 * 60 * 60;

/// Default time a worker may spend on one assignment: one hour.
pub const DEFAULT_ASSIGNMENT_DURATION_SECS: u64 = 60 * 60;

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A crowdsourcing task tracked locally and hosted remotely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,

    /// Name of the job type whose configuration (defaults, hooks) applies.
    pub job_type: String,

    /// Marketplace identifier. Set no later than `launching -> running`.
    pub remote_task_id: Option<String>,
    pub remote_type_id: Option<String>,
    pub remote_url: Option<String>,

    pub title: String,
    pub description: String,
    pub question_kind: QuestionKind,
    /// Question payload handed to the marketplace untouched.
    pub question: serde_json::Value,
    pub keywords: Vec<String>,
    pub reward_cents: u32,

    /// Number of assignment slots requested from the marketplace.
    pub target_assignment_count: u32,
    /// Minimum approved assignments before the job may finish. 0 = no minimum.
    pub required_approved_count: u32,

    pub lifetime_secs: u64,
    pub assignment_duration_secs: u64,

    /// Opaque qualification requirements copied from the job type.
    pub qualifications: Vec<Qualification>,

    pub state: JobState,

    /// Extension reserved in `target_assignment_count` but not yet confirmed
    /// by the marketplace.
    #[serde(default)]
    pub pending_extension: Option<PendingExtension>,

    /// Bumped by every write. Writers compare-and-set against it.
    pub version: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Guard for `launch`: the job carries enough to be posted.
    pub fn ready_to_launch(&self) -> bool {
        !self.title.trim().is_empty()
            && !self.question.is_null()
            && self.target_assignment_count >= 1
    }

    pub fn is_finished(&self) -> bool {
        self.state == JobState::Finished
    }
}

/// Newtype for job IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

/// How the question payload is rendered by the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// The payload points at an externally hosted form.
    #[default]
    External,
    /// The payload is a marketplace-native question form.
    QuestionForm,
}

impl std::fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QuestionKind::External => "external",
            QuestionKind::QuestionForm => "question_form",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for QuestionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "external" => Ok(QuestionKind::External),
            "question_form" => Ok(QuestionKind::QuestionForm),
            other => Err(Error::Other(format!("unknown question kind: {other}"))),
        }
    }
}

/// A qualification requirement. Passed through to the marketplace as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Qualification {
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// An extension in flight. Every attempt carries the same token, so the
/// marketplace grants it at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingExtension {
    pub request_token: String,
    pub assignments: u32,
    pub seconds: Option<u64>,
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created locally, not yet submitted.
    New,
    /// Remote task creation has been scheduled.
    Launching,
    /// Remote task exists and accepts work.
    Running,
    /// Marketplace reports the task reviewable.
    Reviewing,
    /// Done. Terminal.
    Finished,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        self == JobState::Finished
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::New => "new",
            JobState::Launching => "launching",
            JobState::Running => "running",
            JobState::Reviewing => "reviewing",
            JobState::Finished => "finished",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(JobState::New),
            "launching" => Ok(JobState::Launching),
            "running" => Ok(JobState::Running),
            "reviewing" => Ok(JobState::Reviewing),
            "finished" => Ok(JobState::Finished),
            other => Err(Error::Other(format!("unknown job state: {other}"))),
        }
    }
}

/// Events accepted by the job machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEvent {
    Launch,
    Launched,
    Reviewable,
    HitExtended,
    Finish,
}

impl std::fmt::Display for JobEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobEvent::Launch => "launch",
            JobEvent::Launched => "launched",
            JobEvent::Reviewable => "reviewable",
            JobEvent::HitExtended => "hit_extended",
            JobEvent::Finish => "finish",
        };
        write!(f, "{s}")
    }
}

fn enqueue_launch(job: &Job) -> Vec<Task> {
    vec![Task::LaunchTask { job_id: job.id }]
}

fn enqueue_teardown(job: &Job) -> Vec<Task> {
    let mut tasks = Vec::with_capacity(2);
    if let Some(remote_task_id) = &job.remote_task_id {
        tasks.push(Task::DisposeTask {
            remote_task_id: remote_task_id.clone(),
        });
    }
    tasks.push(Task::OnJobFinished { job_id: job.id });
    tasks
}

/// The job lifecycle.
pub static JOB_MACHINE: StateMachine<JobState, JobEvent, Job, Task> = StateMachine {
    name: "job",
    transitions: &[
        Transition {
            event: JobEvent::Launch,
            from: &[JobState::New],
            to: JobState::Launching,
            guard: Some(Job::ready_to_launch),
        },
        Transition {
            event: JobEvent::Launch,
            from: &[JobState::New],
            to: JobState::New,
            guard: None,
        },
        Transition {
            event: JobEvent::Launched,
            from: &[JobState::New, JobState::Launching],
            to: JobState::Running,
            guard: None,
        },
        Transition {
            event: JobEvent::Reviewable,
            from: &[JobState::Running],
            to: JobState::Reviewing,
            guard: None,
        },
        Transition {
            event: JobEvent::HitExtended,
            from: &[JobState::Running, JobState::Reviewing],
            to: JobState::Running,
            guard: None,
        },
        Transition {
            event: JobEvent::Finish,
            from: &[JobState::Running, JobState::Reviewing],
            to: JobState::Finished,
            guard: None,
        },
    ],
    entry_actions: &[
        EntryAction {
            state: JobState::Launching,
            action: enqueue_launch,
        },
        EntryAction {
            state: JobState::Finished,
            action: enqueue_teardown,
        },
    ],
};

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for new jobs. Unset fields fall back to the job type's defaults,
/// then to the crate defaults.
#[derive(Debug, Clone, Default)]
pub struct NewJob {
    pub(crate) job_type: String,
    pub(crate) title: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) question_kind: Option<QuestionKind>,
    pub(crate) question: serde_json::Value,
    pub(crate) keywords: Option<Vec<String>>,
    pub(crate) reward_cents: Option<u32>,
    pub(crate) target_assignment_count: Option<u32>,
    pub(crate) required_approved: Option<RequiredApproved>,
    pub(crate) lifetime_secs: Option<u64>,
    pub(crate) assignment_duration_secs: Option<u64>,
}

/// How many approvals a job needs before it may finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredApproved {
    Count(u32),
    /// Every targeted assignment must be approved.
    All,
}

impl NewJob {
    pub fn new(job_type: impl Into<String>, question: serde_json::Value) -> Self {
        Self {
            job_type: job_type.into(),
            question,
            ..Self::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn question_kind(mut self, kind: QuestionKind) -> Self {
        self.question_kind = Some(kind);
        self
    }

    pub fn keywords<I, K>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.keywords = Some(keywords.into_iter().map(Into::into).collect());
        self
    }

    pub fn reward_cents(mut self, cents: u32) -> Self {
        self.reward_cents = Some(cents);
        self
    }

    pub fn target_assignments(mut self, n: u32) -> Self {
        self.target_assignment_count = Some(n);
        self
    }

    pub fn required_approved(mut self, n: u32) -> Self {
        self.required_approved = Some(RequiredApproved::Count(n));
        self
    }

    pub fn require_all_approved(mut self) -> Self {
        self.required_approved = Some(RequiredApproved::All);
        self
    }

    pub fn lifetime_secs(mut self, secs: u64) -> Self {
        self.lifetime_secs = Some(secs);
        self
    }

    pub fn assignment_duration_secs(mut self, secs: u64) -> Self {
        self.assignment_duration_secs = Some(secs);
        self
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }
}
