//! Progress evaluation against assignment totals.

use crowdq::error::Error;
use crowdq::job_type::JobType;
use crowdq::model::{AssignmentCounts, Job, JobState, NewJob};
use crowdq::progress::{Decision, evaluate, more_needed};
use serde_json::json;

fn job(state: JobState, target: u32, required: u32) -> Job {
    let mut job = JobType::new("survey")
        .build_job(
            NewJob::new("survey", json!({"form": "q1"}))
                .title("Survey")
                .target_assignments(target)
                .required_approved(required),
        )
        .unwrap();
    job.state = state;
    job
}

fn counts(approved: u32, rejected: u32) -> AssignmentCounts {
    AssignmentCounts {
        approved,
        rejected,
        ..AssignmentCounts::default()
    }
}

#[test]
fn more_needed_matches_formula_over_a_grid() {
    for target in 1..=6u32 {
        for required in 0..=target {
            for rejected in 0..=8u32 {
                let expected = if required == 0 {
                    0
                } else {
                    (i64::from(rejected) - i64::from(target - required)).max(0) as u32
                };
                assert_eq!(
                    more_needed(rejected, target, required),
                    expected,
                    "rejected={rejected} target={target} required={required}"
                );
            }
        }
    }
}

#[test]
fn more_needed_is_zero_without_an_approval_minimum() {
    assert_eq!(more_needed(100, 1, 0), 0);
}

#[test]
fn one_approval_finishes_a_single_slot_job() {
    let job = job(JobState::Running, 1, 0);
    assert_eq!(evaluate(&job, &counts(1, 0)).unwrap(), Decision::Finish);
}

#[test]
fn rejections_against_a_full_minimum_extend_by_the_shortfall() {
    let job = job(JobState::Reviewing, 3, 3);
    assert_eq!(
        evaluate(&job, &counts(1, 2)).unwrap(),
        Decision::Extend { assignments: 2 }
    );
}

#[test]
fn spare_slots_absorb_a_rejection() {
    let job = job(JobState::Running, 2, 1);
    assert_eq!(evaluate(&job, &counts(1, 1)).unwrap(), Decision::Finish);
}

#[test]
fn waits_while_slots_are_undecided() {
    let job = job(JobState::Running, 2, 1);
    let mut totals = counts(1, 0);
    totals.submitted = 1;
    assert_eq!(evaluate(&job, &totals).unwrap(), Decision::Wait);
}

#[test]
fn waits_for_slots_granted_by_an_extension() {
    // Target raised by an earlier extension: 5 slots, 3 required, 2 rejected.
    let job = job(JobState::Running, 5, 3);
    assert_eq!(evaluate(&job, &counts(2, 2)).unwrap(), Decision::Wait);
    assert_eq!(evaluate(&job, &counts(3, 2)).unwrap(), Decision::Finish);
}

#[test]
fn finished_job_is_settled() {
    let job = job(JobState::Finished, 3, 3);
    assert_eq!(evaluate(&job, &counts(0, 3)).unwrap(), Decision::Settled);
}

#[test]
fn jobs_not_yet_on_the_marketplace_are_a_state_error() {
    for state in [JobState::New, JobState::Launching] {
        let job = job(state, 1, 0);
        let err = evaluate(&job, &counts(1, 0)).unwrap_err();
        assert!(matches!(err, Error::State(_)), "{state}: {err:?}");
        assert!(!err.is_retryable());
    }
}

#[test]
fn errored_assignments_do_not_count_as_handled() {
    let job = job(JobState::Running, 1, 0);
    let totals = AssignmentCounts {
        errored: 1,
        ..AssignmentCounts::default()
    };
    assert_eq!(evaluate(&job, &totals).unwrap(), Decision::Wait);
}
