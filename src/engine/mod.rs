//! Core engine. The public API for creating jobs and deciding assignments.
//!
//! The engine owns the seams (record store, task queue, marketplace) and the
//! event stream. All state transitions go through here: the transition
//! tables in [`crate::model`] decide, the store's compare-and-set applies,
//! and entry actions are handed to the queue.

pub mod worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{Span, debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::event::{Event, EventKind};
use crate::job_type::{AssignmentEventType, JobTypeRegistry};
use crate::machine::Fired;
use crate::marketplace::{
    CreateTaskRequest, ExtendRequest, MarketplaceClient, RemoteAssignmentStatus,
};
use crate::model::{
    ASSIGNMENT_MACHINE, Assignment, AssignmentCounts, AssignmentEvent, AssignmentId,
    AssignmentState, JOB_MACHINE, Job, JobEvent, JobId, JobState, NewJob, PendingExtension,
};
use crate::progress::{self, Decision};
use crate::queue::{Task, TaskQueue};
use crate::store::{Ingested, RecordStore};
use crate::telemetry::metrics;
use crate::telemetry::task::record_state_transition;

pub use worker::{Outcome, TaskWorker, WorkerConfig};

/// Attempts at a read-decide-write cycle before a lost race is surfaced.
const MAX_CAS_ATTEMPTS: u32 = 8;

const EVENT_CAPACITY: usize = 1024;

/// Answers delivered by the inbound submission adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub remote_task_id: String,
    pub remote_assignment_id: String,
    pub worker_id: String,
    #[serde(default)]
    pub answers: serde_json::Value,
}

/// A job write that has been applied but not yet announced.
struct Committed {
    job: Job,
    event: JobEvent,
    fired: Fired<JobState>,
}

/// The job engine. Owns no state of its own beyond the event sequence.
pub struct Engine {
    store: Arc<dyn RecordStore>,
    queue: Arc<dyn TaskQueue>,
    marketplace: Arc<dyn MarketplaceClient>,
    job_types: Arc<JobTypeRegistry>,
    events: broadcast::Sender<Event>,
    seq: AtomicU64,
}

impl Engine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        queue: Arc<dyn TaskQueue>,
        marketplace: Arc<dyn MarketplaceClient>,
        job_types: Arc<JobTypeRegistry>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            queue,
            marketplace,
            job_types,
            events,
            seq: AtomicU64::new(0),
        }
    }

    /// Subscribe to lifecycle events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    pub fn marketplace(&self) -> &Arc<dyn MarketplaceClient> {
        &self.marketplace
    }

    pub fn job_types(&self) -> &JobTypeRegistry {
        &self.job_types
    }

    fn emit(&self, kind: EventKind) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        // No subscribers is fine.
        let _ = self.events.send(Event {
            seq,
            timestamp: Utc::now(),
            kind,
        });
    }

    fn note_conflict(&self, record: &'static str) {
        metrics::write_conflicts().add(1, &[KeyValue::new("record", record)]);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn get_job(&self, id: JobId) -> Result<Job> {
        self.store.get_job(id).await
    }

    pub async fn list_jobs(&self, state: Option<JobState>, limit: i64) -> Result<Vec<Job>> {
        self.store.list_jobs(state, limit).await
    }

    pub async fn get_assignment(&self, id: AssignmentId) -> Result<Assignment> {
        self.store.get_assignment(id).await
    }

    pub async fn list_assignments(&self, job_id: JobId) -> Result<Vec<Assignment>> {
        self.store.list_assignments(job_id).await
    }

    pub async fn assignment_counts(&self, job_id: JobId) -> Result<AssignmentCounts> {
        self.store.assignment_counts(job_id).await
    }

    // -----------------------------------------------------------------------
    // Job lifecycle
    // -----------------------------------------------------------------------

    /// Create a job from its type's defaults and fire `launch`.
    ///
    /// A job that is not ready to launch (no title or question) stays in
    /// `new`; fire `launch` again once it is complete.
    pub async fn create_job(&self, new: NewJob) -> Result<Job> {
        let job_type = self.job_types.resolve(new.job_type());
        let job = job_type.build_job(new)?;
        self.store.insert_job(&job).await?;

        metrics::jobs_created().add(1, &[KeyValue::new("job_type", job.job_type.clone())]);
        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            target = job.target_assignment_count,
            required = job.required_approved_count,
            "job created"
        );
        self.emit(EventKind::JobCreated {
            id: job.id,
            job_type: job.job_type.clone(),
            target_assignment_count: job.target_assignment_count,
            required_approved_count: job.required_approved_count,
        });

        self.fire(job.id, JobEvent::Launch).await
    }

    /// Fire `event` on a job, re-reading and retrying when another writer
    /// got there first.
    pub async fn fire(&self, id: JobId, event: JobEvent) -> Result<Job> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let job = self.store.get_job(id).await?;
            match self.commit(job, event, |_| {}).await {
                Ok(committed) => return self.announce(committed).await,
                Err(Error::Conflict(_)) => self.note_conflict("job"),
                Err(e) => return Err(e),
            }
        }
        Err(Error::Conflict(format!(
            "job {id}: `{event}` lost {MAX_CAS_ATTEMPTS} write races"
        )))
    }

    /// The marketplace accepted the task.
    pub async fn launched(&self, id: JobId) -> Result<Job> {
        self.fire(id, JobEvent::Launched).await
    }

    /// The marketplace reports the task reviewable.
    pub async fn mark_reviewable(&self, id: JobId) -> Result<Job> {
        self.fire(id, JobEvent::Reviewable).await
    }

    pub async fn finish(&self, id: JobId) -> Result<Job> {
        self.fire(id, JobEvent::Finish).await
    }

    /// Resolve `event` against `job`, apply `update`, and compare-and-set.
    ///
    /// Nothing is enqueued or emitted; see [`Engine::announce`].
    async fn commit(
        &self,
        job: Job,
        event: JobEvent,
        update: impl FnOnce(&mut Job),
    ) -> Result<Committed> {
        let fired = JOB_MACHINE.fire(job.state, event, &job)?;
        let expected = job.version;
        let mut next = job;
        update(&mut next);
        next.state = fired.to;
        if fired.changed() && fired.to.is_terminal() {
            next.finished_at = Some(Utc::now());
        }
        let job = self.store.compare_and_swap_job(expected, &next).await?;
        Ok(Committed { job, event, fired })
    }

    /// Enqueue the entry actions of a committed transition and report it.
    async fn announce(&self, committed: Committed) -> Result<Job> {
        let Committed { job, event, fired } = committed;

        for task in JOB_MACHINE.entry_actions(&fired, &job) {
            debug!(job_id = %job.id, task = task.name(), "enqueue entry action");
            self.queue.enqueue(&task).await?;
        }

        let from = fired.from.to_string();
        let to = fired.to.to_string();
        metrics::job_transitions().add(
            1,
            &[
                KeyValue::new("event", event.to_string()),
                KeyValue::new("from", from.clone()),
                KeyValue::new("to", to.clone()),
            ],
        );
        record_state_transition(&Span::current(), "job", &from, &to);
        info!(job_id = %job.id, %event, %from, %to, "job transition");
        self.emit(EventKind::JobTransition {
            id: job.id,
            event,
            from: fired.from,
            to: fired.to,
        });
        Ok(job)
    }

    /// Create the remote task for a `launching` job, then fire `launched`.
    ///
    /// Safe to repeat: jobs past `launching` are left alone, a job that
    /// already carries a remote id skips creation, and the job id is the
    /// marketplace request token.
    pub async fn launch_remote(&self, id: JobId) -> Result<Job> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let job = self.store.get_job(id).await?;
            if job.state != JobState::Launching {
                debug!(job_id = %id, state = %job.state, "launch skipped");
                return Ok(job);
            }
            if job.remote_task_id.is_some() {
                return self.launched(id).await;
            }

            let remote = self
                .marketplace
                .create_task(&CreateTaskRequest::from(&job))
                .await?;
            info!(job_id = %id, remote_task_id = %remote.id, "remote task created");

            let expected = job.version;
            let mut next = job;
            next.remote_task_id = Some(remote.id);
            next.remote_type_id = Some(remote.type_id);
            next.remote_url = remote.url;
            match self.store.compare_and_swap_job(expected, &next).await {
                Ok(_) => return self.launched(id).await,
                Err(Error::Conflict(_)) => self.note_conflict("job"),
                Err(e) => return Err(e),
            }
        }
        Err(Error::Conflict(format!(
            "job {id}: launch lost {MAX_CAS_ATTEMPTS} write races"
        )))
    }

    // -----------------------------------------------------------------------
    // Progress and extension
    // -----------------------------------------------------------------------

    /// Evaluate a job's progress and act on the decision.
    ///
    /// Extension and finishing are compare-and-set writes against the
    /// version the decision was made from, so concurrent evaluators of the
    /// same job cannot both extend or both finish: the loser re-reads and
    /// decides again from the new totals. An extension left pending by an
    /// earlier attempt is completed before anything else is decided.
    pub async fn check_progress(&self, id: JobId) -> Result<Decision> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let job = self.store.get_job(id).await?;
            if job.pending_extension.is_some() && !job.is_finished() {
                self.send_extension(job).await?;
                continue;
            }
            let counts = self.store.assignment_counts(id).await?;
            let decision = progress::evaluate(&job, &counts)?;
            debug!(
                job_id = %id,
                approved = counts.approved,
                rejected = counts.rejected,
                ?decision,
                "progress evaluated"
            );

            let acted = match decision {
                Decision::Settled | Decision::Wait => return Ok(decision),
                Decision::Extend { assignments } => self
                    .extend_from(job, ExtendRequest {
                        assignments: Some(assignments),
                        seconds: None,
                    })
                    .await
                    .map(|_| ()),
                Decision::Finish => match self.commit(job, JobEvent::Finish, |_| {}).await {
                    Ok(committed) => self.announce(committed).await.map(|_| ()),
                    Err(e) => Err(e),
                },
            };
            match acted {
                Ok(()) => return Ok(decision),
                Err(Error::Conflict(_)) => self.note_conflict("job"),
                Err(e) => return Err(e),
            }
        }
        Err(Error::Conflict(format!(
            "job {id}: progress check lost {MAX_CAS_ATTEMPTS} write races"
        )))
    }

    /// Grant more assignment slots and/or lifetime to a running job.
    ///
    /// `assignments` defaults to the slots rejections took from the approval
    /// minimum. Returns the job unchanged when there is nothing to grant.
    pub async fn extend_hit(&self, id: JobId, request: ExtendRequest) -> Result<Job> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let job = self.store.get_job(id).await?;
            if job.pending_extension.is_some() && !job.is_finished() {
                self.send_extension(job).await?;
                continue;
            }
            let assignments = match request.assignments {
                Some(n) => n,
                None => {
                    let counts = self.store.assignment_counts(id).await?;
                    progress::more_needed(
                        counts.rejected,
                        job.target_assignment_count,
                        job.required_approved_count,
                    )
                }
            };
            if assignments == 0 && request.seconds.is_none() {
                debug!(job_id = %id, "nothing to extend");
                return Ok(job);
            }

            let request = ExtendRequest {
                assignments: (assignments > 0).then_some(assignments),
                seconds: request.seconds,
            };
            match self.extend_from(job, request).await {
                Err(Error::Conflict(_)) => self.note_conflict("job"),
                other => return other,
            }
        }
        Err(Error::Conflict(format!(
            "job {id}: extension lost {MAX_CAS_ATTEMPTS} write races"
        )))
    }

    /// Reserve the slots locally, then send the extension.
    ///
    /// The reservation raises the target and records the pending extension
    /// in one write, so a concurrent evaluator sees the raised target and a
    /// crash before the marketplace answers leaves a record to resume from.
    /// The job's state does not move until the marketplace accepts.
    async fn extend_from(&self, job: Job, request: ExtendRequest) -> Result<Job> {
        if job.remote_task_id.is_none() {
            return Err(Error::State(format!(
                "job {} has no remote task to extend",
                job.id
            )));
        }
        JOB_MACHINE.fire(job.state, JobEvent::HitExtended, &job)?;

        let granted = request.assignments.unwrap_or(0);
        let target = job
            .target_assignment_count
            .checked_add(granted)
            .ok_or_else(|| {
                Error::InvalidJob(format!(
                    "extending job {} by {granted} slots overflows its target",
                    job.id
                ))
            })?;

        let expected = job.version;
        let mut next = job;
        next.target_assignment_count = target;
        next.pending_extension = Some(PendingExtension {
            request_token: Uuid::new_v4().to_string(),
            assignments: granted,
            seconds: request.seconds,
        });
        let reserved = self.store.compare_and_swap_job(expected, &next).await?;
        debug!(job_id = %reserved.id, granted, target, "extension reserved");
        self.send_extension(reserved).await
    }

    /// Send the job's pending extension and settle the outcome.
    ///
    /// Accepted: fire `hit_extended`. Refused outright: release the reserved
    /// slots. Transport failure: keep the reservation so the next attempt
    /// resends the same token.
    async fn send_extension(&self, job: Job) -> Result<Job> {
        let (Some(pending), Some(remote_task_id)) =
            (job.pending_extension.clone(), job.remote_task_id.clone())
        else {
            return Ok(job);
        };
        let request = ExtendRequest {
            assignments: (pending.assignments > 0).then_some(pending.assignments),
            seconds: pending.seconds,
        };

        if let Err(e) = self
            .marketplace
            .extend_task(&remote_task_id, &pending.request_token, request)
            .await
        {
            if e.is_transient() {
                warn!(
                    job_id = %job.id,
                    %remote_task_id,
                    granted = pending.assignments,
                    error = %e,
                    "extension not confirmed, keeping reservation"
                );
            } else {
                warn!(
                    job_id = %job.id,
                    %remote_task_id,
                    granted = pending.assignments,
                    error = %e,
                    "extension refused, releasing reserved slots"
                );
                if let Err(release) = self.release_extension(job.id, &pending).await {
                    error!(
                        job_id = %job.id,
                        error = %release,
                        "could not release reserved slots"
                    );
                }
            }
            return Err(e.into());
        }

        self.settle_extension(job.id, &pending).await
    }

    /// The marketplace granted `pending`: clear it and fire `hit_extended`.
    async fn settle_extension(&self, id: JobId, pending: &PendingExtension) -> Result<Job> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let job = self.store.get_job(id).await?;
            if job.pending_extension.as_ref() != Some(pending) {
                return Ok(job);
            }
            match self
                .commit(job, JobEvent::HitExtended, |j| j.pending_extension = None)
                .await
            {
                Ok(committed) => {
                    metrics::slots_extended().add(u64::from(pending.assignments), &[]);
                    let job = self.announce(committed).await?;
                    info!(
                        job_id = %job.id,
                        granted = pending.assignments,
                        target = job.target_assignment_count,
                        "job extended"
                    );
                    self.emit(EventKind::JobExtended {
                        id: job.id,
                        assignments: pending.assignments,
                        target_assignment_count: job.target_assignment_count,
                    });
                    return Ok(job);
                }
                Err(Error::Conflict(_)) => self.note_conflict("job"),
                Err(e) => return Err(e),
            }
        }
        Err(Error::Conflict(format!(
            "job {id}: settling extension lost {MAX_CAS_ATTEMPTS} write races"
        )))
    }

    /// The marketplace refused `pending`: hand its slots back.
    async fn release_extension(&self, id: JobId, pending: &PendingExtension) -> Result<()> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let job = self.store.get_job(id).await?;
            if job.pending_extension.as_ref() != Some(pending) {
                return Ok(());
            }
            let expected = job.version;
            let mut next = job;
            next.target_assignment_count = next
                .target_assignment_count
                .saturating_sub(pending.assignments);
            next.pending_extension = None;
            match self.store.compare_and_swap_job(expected, &next).await {
                Ok(_) => return Ok(()),
                Err(Error::Conflict(_)) => self.note_conflict("job"),
                Err(e) => return Err(e),
            }
        }
        Err(Error::Conflict(format!(
            "job {id}: releasing {} slots lost {MAX_CAS_ATTEMPTS} write races",
            pending.assignments
        )))
    }

    // -----------------------------------------------------------------------
    // Assignments
    // -----------------------------------------------------------------------

    /// Record a worker response in `submitted`, once per remote assignment id.
    ///
    /// A first sighting runs the `submitted` handlers and, for auto-approving
    /// job types, schedules approval. A repeat returns the stored record and
    /// does nothing else.
    pub async fn ingest_assignment(
        &self,
        job_id: JobId,
        remote_assignment_id: &str,
        worker_id: &str,
        answers: serde_json::Value,
    ) -> Result<Ingested> {
        let job = self.store.get_job(job_id).await?;
        let ingested = self
            .store
            .insert_assignment_if_absent(&Assignment::submitted(
                job_id,
                remote_assignment_id,
                worker_id,
                answers,
            ))
            .await?;

        let Ingested::Created(assignment) = &ingested else {
            metrics::assignments_ingested().add(1, &[KeyValue::new("result", "duplicate")]);
            debug!(%job_id, remote_assignment_id, "assignment already known");
            return Ok(ingested);
        };

        metrics::assignments_ingested().add(1, &[KeyValue::new("result", "created")]);
        info!(
            %job_id,
            assignment_id = %assignment.id,
            remote_assignment_id,
            worker_id,
            "assignment ingested"
        );
        self.emit(EventKind::AssignmentIngested {
            id: assignment.id,
            job_id,
            remote_assignment_id: assignment.remote_assignment_id.clone(),
            worker_id: assignment.worker_id.clone(),
        });

        let job_type = self.job_types.resolve(&job.job_type);
        job_type
            .hooks()
            .dispatch(AssignmentEventType::Submitted, &job, assignment)?;
        if job_type.auto_approve {
            self.queue
                .enqueue(&Task::ApproveTask {
                    assignment_id: assignment.id,
                })
                .await?;
        }
        Ok(ingested)
    }

    /// Entry point for the inbound answers adapter.
    pub async fn handle_submission(&self, submission: Submission) -> Result<Ingested> {
        let job = self
            .store
            .find_job_by_remote_task(&submission.remote_task_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no job for remote task {}",
                    submission.remote_task_id
                ))
            })?;
        self.ingest_assignment(
            job.id,
            &submission.remote_assignment_id,
            &submission.worker_id,
            submission.answers,
        )
        .await
    }

    pub async fn approve_assignment(
        &self,
        id: AssignmentId,
        feedback: Option<&str>,
    ) -> Result<Assignment> {
        self.decide(id, AssignmentEvent::Approve, feedback).await
    }

    pub async fn reject_assignment(
        &self,
        id: AssignmentId,
        feedback: Option<&str>,
    ) -> Result<Assignment> {
        self.decide(id, AssignmentEvent::Reject, feedback).await
    }

    /// Park an assignment whose answers could not be processed. No handlers
    /// run and progress is not re-evaluated.
    pub async fn mark_error(&self, id: AssignmentId, reason: Option<&str>) -> Result<Assignment> {
        self.decide(id, AssignmentEvent::Fail, reason).await
    }

    /// Decide remotely, then compare-and-set locally, then notify.
    async fn decide(
        &self,
        id: AssignmentId,
        event: AssignmentEvent,
        feedback: Option<&str>,
    ) -> Result<Assignment> {
        let assignment = self.store.get_assignment(id).await?;
        let fired = ASSIGNMENT_MACHINE.fire(assignment.state, event, &assignment)?;

        match event {
            AssignmentEvent::Approve => {
                self.marketplace
                    .approve_assignment(&assignment.remote_assignment_id, feedback)
                    .await?
            }
            AssignmentEvent::Reject => {
                self.marketplace
                    .reject_assignment(&assignment.remote_assignment_id, feedback)
                    .await?
            }
            AssignmentEvent::Fail => {}
        }

        let Some(updated) = self
            .store
            .transition_assignment(id, fired.from, fired.to, feedback)
            .await?
        else {
            self.note_conflict("assignment");
            let current = self.store.get_assignment(id).await?;
            return Err(Error::NoTransitionFound {
                machine: ASSIGNMENT_MACHINE.name,
                event: event.to_string(),
                state: current.state.to_string(),
            });
        };

        let to = updated.state.to_string();
        metrics::assignment_transitions().add(
            1,
            &[
                KeyValue::new("event", event.to_string()),
                KeyValue::new("to", to.clone()),
            ],
        );
        record_state_transition(&Span::current(), "assignment", &fired.from.to_string(), &to);
        info!(
            assignment_id = %id,
            job_id = %updated.job_id,
            %event,
            to = %to,
            "assignment transition"
        );
        self.emit(EventKind::AssignmentTransition {
            id,
            job_id: updated.job_id,
            event,
            from: fired.from,
            to: fired.to,
        });

        let Some(kind) = AssignmentEventType::for_state(updated.state) else {
            return Ok(updated);
        };
        let job = self.store.get_job(updated.job_id).await?;
        self.job_types
            .resolve(&job.job_type)
            .hooks()
            .dispatch(kind, &job, &updated)?;

        match job.state {
            JobState::Running | JobState::Reviewing => {
                self.check_progress(job.id).await?;
            }
            state => debug!(job_id = %job.id, %state, "progress check deferred"),
        }
        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // Marketplace synchronisation
    // -----------------------------------------------------------------------

    /// Ingest every assignment the marketplace lists for a job, carry over
    /// decisions made remotely, then check progress.
    ///
    /// For auto-approving job types, assignments that were already known and
    /// are still `submitted` on both sides are approved here.
    ///
    /// Returns `None` when the job has nothing to evaluate yet.
    pub async fn sync_job(&self, id: JobId) -> Result<Option<Decision>> {
        let job = self.store.get_job(id).await?;
        if job.is_finished() {
            return Ok(Some(Decision::Settled));
        }
        let Some(remote_task_id) = job.remote_task_id.clone() else {
            debug!(job_id = %id, state = %job.state, "sync skipped, no remote task");
            return Ok(None);
        };

        let auto_approve = self.job_types.resolve(&job.job_type).auto_approve;
        let remote = self.marketplace.list_assignments(&remote_task_id).await?;
        for remote_assignment in remote {
            let ingested = self
                .ingest_assignment(
                    id,
                    &remote_assignment.id,
                    &remote_assignment.worker_id,
                    remote_assignment.answers.clone(),
                )
                .await?;
            let local = ingested.assignment();
            if local.state != AssignmentState::Submitted {
                continue;
            }
            match remote_assignment.status {
                // An approval scheduled at first sighting may have been lost.
                RemoteAssignmentStatus::Submitted if auto_approve && !ingested.is_created() => {
                    self.approve_assignment(local.id, None).await?;
                }
                RemoteAssignmentStatus::Submitted => {}
                RemoteAssignmentStatus::Approved => {
                    self.approve_assignment(local.id, None).await?;
                }
                RemoteAssignmentStatus::Rejected => {
                    self.reject_assignment(local.id, None).await?;
                }
            }
        }

        let job = self.store.get_job(id).await?;
        match job.state {
            JobState::Running | JobState::Reviewing => Ok(Some(self.check_progress(id).await?)),
            JobState::Finished => Ok(Some(Decision::Settled)),
            JobState::New | JobState::Launching => Ok(None),
        }
    }

    /// Fetch one remote assignment and ingest it.
    ///
    /// Returns `None` when no local job owns the task or the marketplace does
    /// not list the assignment.
    pub async fn poll_result(
        &self,
        remote_task_id: &str,
        remote_assignment_id: &str,
    ) -> Result<Option<Ingested>> {
        let Some(job) = self.store.find_job_by_remote_task(remote_task_id).await? else {
            warn!(remote_task_id, "poll for unknown remote task");
            return Ok(None);
        };
        let remote = self.marketplace.list_assignments(remote_task_id).await?;
        let Some(found) = remote.into_iter().find(|a| a.id == remote_assignment_id) else {
            warn!(remote_task_id, remote_assignment_id, "assignment not listed");
            return Ok(None);
        };
        self.ingest_assignment(job.id, &found.id, &found.worker_id, found.answers)
            .await
            .map(Some)
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Retire a remote task. A task that is already gone counts as retired.
    pub async fn dispose_remote(&self, remote_task_id: &str) -> Result<()> {
        match self.retire_remote(remote_task_id, false).await {
            Err(Error::Marketplace(e)) if e.is_not_found() => {
                debug!(remote_task_id, "remote task already gone");
                Ok(())
            }
            other => other,
        }
    }

    /// Expire the task if it is still open, optionally approve whatever is
    /// still awaiting review, then dispose it.
    async fn retire_remote(&self, remote_task_id: &str, approve_pending: bool) -> Result<()> {
        let task = self.marketplace.find_task(remote_task_id).await?;
        if task.status.is_open() {
            self.marketplace.expire_task(remote_task_id).await?;
        }
        if approve_pending {
            for assignment in self.marketplace.list_assignments(remote_task_id).await? {
                if assignment.status != RemoteAssignmentStatus::Submitted {
                    continue;
                }
                match self.marketplace.approve_assignment(&assignment.id, None).await {
                    Err(e) if e.is_not_found() => {}
                    other => other?,
                }
            }
        }
        self.marketplace.dispose_task(remote_task_id).await?;
        info!(remote_task_id, "remote task disposed");
        Ok(())
    }

    /// Run the finished handlers of a finished job and announce it.
    pub async fn job_finished(&self, id: JobId) -> Result<()> {
        let job = self.store.get_job(id).await?;
        if !job.is_finished() {
            debug!(job_id = %id, state = %job.state, "job not finished, skipping");
            return Ok(());
        }
        let counts = self.store.assignment_counts(id).await?;
        self.job_types.resolve(&job.job_type).dispatch_finished(&job)?;
        info!(
            job_id = %id,
            approved = counts.approved,
            rejected = counts.rejected,
            "job finished"
        );
        self.emit(EventKind::JobFinished {
            id,
            approved: counts.approved,
            rejected: counts.rejected,
        });
        Ok(())
    }

    /// Delete a job and its assignments after retiring its remote task.
    ///
    /// The remote task is expired if still open, every assignment still
    /// awaiting review there is approved, and the task is disposed. A remote
    /// task that no longer exists is skipped.
    pub async fn destroy_job(&self, id: JobId) -> Result<()> {
        let job = self.store.get_job(id).await?;
        if let Some(remote_task_id) = &job.remote_task_id {
            match self.retire_remote(remote_task_id, true).await {
                Err(Error::Marketplace(e)) if e.is_not_found() => {
                    debug!(job_id = %id, %remote_task_id, "remote task already gone");
                }
                other => other?,
            }
        }
        self.store.delete_job(id).await?;
        info!(job_id = %id, "job destroyed");
        Ok(())
    }
}
