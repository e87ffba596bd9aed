//! Job types: per-type defaults, qualifications, auto-approval and hooks.
//!
//! A job names its type; the engine resolves the type from a
//! [`JobTypeRegistry`] built once at startup. Types can be declared in code
//! (with handlers) or loaded from TOML files (configuration only).

pub mod hooks;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use crate::error::{Error, HookError, Result};
use crate::model::{
    Assignment, DEFAULT_ASSIGNMENT_DURATION_SECS, DEFAULT_LIFETIME_SECS, Job, JobId, JobState,
    NewJob, Qualification, QuestionKind, RequiredApproved,
};

pub use hooks::{AssignmentEventType, AssignmentHandler, AssignmentHooks, JobHandler};

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct JobTypeFile {
    job_type: JobTypeMeta,
}

#[derive(Debug, Deserialize)]
struct JobTypeMeta {
    name: String,
    #[serde(default)]
    auto_approve: bool,
    #[serde(default)]
    defaults: JobDefaults,
    #[serde(default)]
    qualifications: Vec<Qualification>,
}

/// Values applied to new jobs that leave a field unset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobDefaults {
    pub title: Option<String>,
    pub description: Option<String>,
    pub question_kind: Option<QuestionKind>,
    pub keywords: Option<Vec<String>>,
    pub reward_cents: Option<u32>,
    pub target_assignment_count: Option<u32>,
    pub required_approved_count: Option<u32>,
    #[serde(default)]
    pub require_all_approved: bool,
    pub lifetime_secs: Option<u64>,
    pub assignment_duration_secs: Option<u64>,
}

/// Configuration shared by every job of one type.
#[derive(Clone)]
pub struct JobType {
    pub name: String,
    pub defaults: JobDefaults,
    pub qualifications: Vec<Qualification>,
    /// Approve every submitted assignment without review.
    pub auto_approve: bool,
    hooks: AssignmentHooks,
    finished_hooks: Vec<JobHandler>,
}

impl std::fmt::Debug for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobType")
            .field("name", &self.name)
            .field("defaults", &self.defaults)
            .field("qualifications", &self.qualifications)
            .field("auto_approve", &self.auto_approve)
            .field("hooks", &self.hooks)
            .field("finished_hooks", &self.finished_hooks.len())
            .finish()
    }
}

impl JobType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            defaults: JobDefaults::default(),
            qualifications: Vec::new(),
            auto_approve: false,
            hooks: AssignmentHooks::default(),
            finished_hooks: Vec::new(),
        }
    }

    pub fn defaults(mut self, defaults: JobDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn qualification(mut self, kind: impl Into<String>, params: serde_json::Value) -> Self {
        self.qualifications.push(Qualification {
            kind: kind.into(),
            params,
        });
        self
    }

    pub fn auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    pub fn on_assignment<F>(mut self, event: AssignmentEventType, handler: F) -> Self
    where
        F: Fn(&Job, &Assignment) -> std::result::Result<(), HookError> + Send + Sync + 'static,
    {
        self.hooks.register(event, Arc::new(handler));
        self
    }

    pub fn on_assignment_submitted<F>(self, handler: F) -> Self
    where
        F: Fn(&Job, &Assignment) -> std::result::Result<(), HookError> + Send + Sync + 'static,
    {
        self.on_assignment(AssignmentEventType::Submitted, handler)
    }

    pub fn on_assignment_approved<F>(self, handler: F) -> Self
    where
        F: Fn(&Job, &Assignment) -> std::result::Result<(), HookError> + Send + Sync + 'static,
    {
        self.on_assignment(AssignmentEventType::Approved, handler)
    }

    pub fn on_assignment_rejected<F>(self, handler: F) -> Self
    where
        F: Fn(&Job, &Assignment) -> std::result::Result<(), HookError> + Send + Sync + 'static,
    {
        self.on_assignment(AssignmentEventType::Rejected, handler)
    }

    pub fn on_job_finished<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Job) -> std::result::Result<(), HookError> + Send + Sync + 'static,
    {
        self.finished_hooks.push(Arc::new(handler));
        self
    }

    pub fn hooks(&self) -> &AssignmentHooks {
        &self.hooks
    }

    /// Run the job-finished handlers in order. The first failure aborts.
    pub fn dispatch_finished(&self, job: &Job) -> Result<()> {
        for handler in &self.finished_hooks {
            handler(job).map_err(|source| Error::Hook {
                event: "job_finished".to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Materialize a new job record in state `new`.
    ///
    /// Caller values win over this type's defaults, which win over the
    /// crate defaults.
    pub fn build_job(&self, new: NewJob) -> Result<Job> {
        let d = &self.defaults;
        let target = new
            .target_assignment_count
            .or(d.target_assignment_count)
            .unwrap_or(1);
        if target == 0 {
            return Err(Error::InvalidJob(
                "target_assignment_count must be at least 1".to_string(),
            ));
        }

        let required = match new.required_approved {
            Some(RequiredApproved::All) => target,
            Some(RequiredApproved::Count(n)) => n,
            None if d.require_all_approved => target,
            None => d.required_approved_count.unwrap_or(0),
        };
        if required > target {
            return Err(Error::InvalidJob(format!(
                "required_approved_count ({required}) exceeds target_assignment_count ({target})"
            )));
        }

        let now = Utc::now();
        Ok(Job {
            id: JobId::new(),
            job_type: self.name.clone(),
            remote_task_id: None,
            remote_type_id: None,
            remote_url: None,
            title: new.title.or_else(|| d.title.clone()).unwrap_or_default(),
            description: new
                .description
                .or_else(|| d.description.clone())
                .unwrap_or_default(),
            question_kind: new.question_kind.or(d.question_kind).unwrap_or_default(),
            question: new.question,
            keywords: new
                .keywords
                .or_else(|| d.keywords.clone())
                .unwrap_or_default(),
            reward_cents: new.reward_cents.or(d.reward_cents).unwrap_or(0),
            target_assignment_count: target,
            required_approved_count: required,
            lifetime_secs: new
                .lifetime_secs
                .or(d.lifetime_secs)
                .unwrap_or(DEFAULT_LIFETIME_SECS),
            assignment_duration_secs: new
                .assignment_duration_secs
                .or(d.assignment_duration_secs)
                .unwrap_or(DEFAULT_ASSIGNMENT_DURATION_SECS),
            qualifications: self.qualifications.clone(),
            state: JobState::New,
            pending_extension: None,
            version: 0,
            created_at: now,
            updated_at: now,
            finished_at: None,
        })
    }
}

/// Registry of job types, indexed by name.
#[derive(Debug, Default)]
pub struct JobTypeRegistry {
    job_types: HashMap<String, Arc<JobType>>,
}

impl JobTypeRegistry {
    /// Create an empty registry with no job types.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add (or replace) a job type.
    pub fn register(&mut self, job_type: JobType) -> &mut Self {
        self.job_types
            .insert(job_type.name.clone(), Arc::new(job_type));
        self
    }

    /// Load all `.toml` files from a directory and build the registry.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut registry = Self::empty();

        let entries = std::fs::read_dir(dir).map_err(|e| {
            Error::Config(format!("cannot read job type dir {}: {e}", dir.display()))
        })?;

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                let content = std::fs::read_to_string(&path)?;
                let file: JobTypeFile = toml::from_str(&content).map_err(|e| {
                    Error::Config(format!("bad job type config {}: {e}", path.display()))
                })?;
                let meta = file.job_type;
                let mut job_type = JobType::new(meta.name)
                    .defaults(meta.defaults)
                    .auto_approve(meta.auto_approve);
                job_type.qualifications = meta.qualifications;
                registry.register(job_type);
            }
        }

        Ok(registry)
    }

    /// Look up a job type by name.
    pub fn get(&self, name: &str) -> Option<Arc<JobType>> {
        self.job_types.get(name).cloned()
    }

    /// The registered type, or an unconfigured one with no hooks.
    pub fn resolve(&self, name: &str) -> Arc<JobType> {
        self.get(name)
            .unwrap_or_else(|| Arc::new(JobType::new(name)))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.job_types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
