//! Progress evaluation: decide whether a job needs more assignments or is done.
//!
//! Rejections consume slots. When an approval minimum is set, the job is
//! extended by exactly the slots rejections took away from that minimum, and
//! finishes once every slot has a decision and the minimum is met.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{AssignmentCounts, Job, JobState};

/// What the evaluator wants done to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// The job is already finished.
    Settled,
    /// Request this many extra assignment slots.
    Extend { assignments: u32 },
    /// Fire `finish`.
    Finish,
    /// Not enough decided assignments yet.
    Wait,
}

/// Extra slots needed to still reach `required` approvals.
///
/// `max(0, rejected - (target - required))` when `required > 0`, else 0.
pub fn more_needed(rejected: u32, target: u32, required: u32) -> u32 {
    if required == 0 {
        return 0;
    }
    let spare = i64::from(target) - i64::from(required);
    (i64::from(rejected) - spare).clamp(0, i64::from(u32::MAX)) as u32
}

/// Every slot has an approval or a rejection.
pub fn all_handled(job: &Job, counts: &AssignmentCounts) -> bool {
    counts.approved + counts.rejected >= job.target_assignment_count
}

pub fn enough_approved(job: &Job, counts: &AssignmentCounts) -> bool {
    job.required_approved_count == 0 || counts.approved >= job.required_approved_count
}

/// Evaluate a job against its assignment totals.
///
/// Fails with [`Error::State`] for jobs that have not reached the marketplace
/// yet (`new`, `launching`).
pub fn evaluate(job: &Job, counts: &AssignmentCounts) -> Result<Decision> {
    match job.state {
        JobState::Finished => return Ok(Decision::Settled),
        JobState::New | JobState::Launching => {
            return Err(Error::State(format!(
                "cannot check progress of job {} in state {}",
                job.id, job.state
            )));
        }
        JobState::Running | JobState::Reviewing => {}
    }

    let needed = more_needed(
        counts.rejected,
        job.target_assignment_count,
        job.required_approved_count,
    );
    if needed > 0 {
        Ok(Decision::Extend {
            assignments: needed,
        })
    } else if all_handled(job, counts) && enough_approved(job, counts) {
        Ok(Decision::Finish)
    } else {
        Ok(Decision::Wait)
    }
}
