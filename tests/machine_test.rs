//! Transition tables for jobs and assignments.

use crowdq::error::Error;
use crowdq::job_type::JobType;
use crowdq::model::{
    ASSIGNMENT_MACHINE, Assignment, AssignmentEvent, AssignmentState, JOB_MACHINE, Job, JobEvent,
    JobId, JobState, NewJob,
};
use crowdq::queue::Task;
use serde_json::json;

fn job(state: JobState) -> Job {
    let mut job = JobType::new("tag-images")
        .build_job(NewJob::new("tag-images", json!({"url": "https://example.com/form"})).title("Tag"))
        .unwrap();
    job.state = state;
    job
}

const ALL_JOB_STATES: [JobState; 5] = [
    JobState::New,
    JobState::Launching,
    JobState::Running,
    JobState::Reviewing,
    JobState::Finished,
];

const ALL_JOB_EVENTS: [JobEvent; 5] = [
    JobEvent::Launch,
    JobEvent::Launched,
    JobEvent::Reviewable,
    JobEvent::HitExtended,
    JobEvent::Finish,
];

#[test]
fn launch_enters_launching_and_schedules_launch_task() {
    let job = job(JobState::New);
    let fired = JOB_MACHINE.fire(job.state, JobEvent::Launch, &job).unwrap();
    assert_eq!(fired.to, JobState::Launching);
    assert_eq!(
        JOB_MACHINE.entry_actions(&fired, &job),
        vec![Task::LaunchTask { job_id: job.id }]
    );
}

#[test]
fn launch_without_title_is_a_self_loop_with_no_side_effects() {
    let mut job = job(JobState::New);
    job.title = "  ".to_string();
    let fired = JOB_MACHINE.fire(job.state, JobEvent::Launch, &job).unwrap();
    assert_eq!(fired.to, JobState::New);
    assert!(!fired.changed());
    assert!(JOB_MACHINE.entry_actions(&fired, &job).is_empty());
}

#[test]
fn launch_without_question_stays_new() {
    let mut job = job(JobState::New);
    job.question = serde_json::Value::Null;
    let fired = JOB_MACHINE.fire(job.state, JobEvent::Launch, &job).unwrap();
    assert_eq!(fired.to, JobState::New);
}

#[test]
fn job_transition_table() {
    let expected = [
        (JobEvent::Launched, JobState::New, JobState::Running),
        (JobEvent::Launched, JobState::Launching, JobState::Running),
        (JobEvent::Reviewable, JobState::Running, JobState::Reviewing),
        (JobEvent::HitExtended, JobState::Running, JobState::Running),
        (JobEvent::HitExtended, JobState::Reviewing, JobState::Running),
        (JobEvent::Finish, JobState::Running, JobState::Finished),
        (JobEvent::Finish, JobState::Reviewing, JobState::Finished),
    ];
    for (event, from, to) in expected {
        let job = job(from);
        let fired = JOB_MACHINE.fire(from, event, &job).unwrap();
        assert_eq!(fired.to, to, "{event} from {from}");
    }
}

#[test]
fn events_outside_the_table_fail_with_no_transition_found() {
    let allowed = [
        (JobEvent::Launch, JobState::New),
        (JobEvent::Launched, JobState::New),
        (JobEvent::Launched, JobState::Launching),
        (JobEvent::Reviewable, JobState::Running),
        (JobEvent::HitExtended, JobState::Running),
        (JobEvent::HitExtended, JobState::Reviewing),
        (JobEvent::Finish, JobState::Running),
        (JobEvent::Finish, JobState::Reviewing),
    ];
    for state in ALL_JOB_STATES {
        for event in ALL_JOB_EVENTS {
            if allowed.contains(&(event, state)) {
                continue;
            }
            let job = job(state);
            match JOB_MACHINE.fire(state, event, &job) {
                Err(Error::NoTransitionFound {
                    machine,
                    event: e,
                    state: s,
                }) => {
                    assert_eq!(machine, "job");
                    assert_eq!(e, event.to_string());
                    assert_eq!(s, state.to_string());
                }
                other => panic!("{event} from {state}: expected NoTransitionFound, got {other:?}"),
            }
        }
    }
}

#[test]
fn finished_is_terminal() {
    assert!(JOB_MACHINE.events_from(JobState::Finished).is_empty());
    assert!(JobState::Finished.is_terminal());
}

#[test]
fn finishing_schedules_dispose_then_finished_notification() {
    let mut job = job(JobState::Running);
    job.remote_task_id = Some("T000001".to_string());
    let fired = JOB_MACHINE.fire(job.state, JobEvent::Finish, &job).unwrap();
    assert_eq!(
        JOB_MACHINE.entry_actions(&fired, &job),
        vec![
            Task::DisposeTask {
                remote_task_id: "T000001".to_string()
            },
            Task::OnJobFinished { job_id: job.id },
        ]
    );
}

#[test]
fn extension_self_loop_schedules_nothing() {
    let job = job(JobState::Running);
    let fired = JOB_MACHINE
        .fire(job.state, JobEvent::HitExtended, &job)
        .unwrap();
    assert!(!fired.changed());
    assert!(JOB_MACHINE.entry_actions(&fired, &job).is_empty());
}

#[test]
fn events_from_lists_each_event_once() {
    assert_eq!(JOB_MACHINE.events_from(JobState::New), vec![
        JobEvent::Launch,
        JobEvent::Launched
    ]);
    assert_eq!(JOB_MACHINE.events_from(JobState::Reviewing), vec![
        JobEvent::HitExtended,
        JobEvent::Finish
    ]);
}

#[test]
fn assignment_decisions_leave_submitted_for_good() {
    let assignment = Assignment::submitted(JobId::new(), "A000001", "W1", json!({"tag": "cat"}));
    for (event, to) in [
        (AssignmentEvent::Approve, AssignmentState::Approved),
        (AssignmentEvent::Reject, AssignmentState::Rejected),
        (AssignmentEvent::Fail, AssignmentState::Error),
    ] {
        let fired = ASSIGNMENT_MACHINE
            .fire(AssignmentState::Submitted, event, &assignment)
            .unwrap();
        assert_eq!(fired.to, to);
        assert!(to.is_terminal());

        for again in [
            AssignmentEvent::Approve,
            AssignmentEvent::Reject,
            AssignmentEvent::Fail,
        ] {
            let err = ASSIGNMENT_MACHINE.fire(to, again, &assignment).unwrap_err();
            assert!(matches!(err, Error::NoTransitionFound { machine: "assignment", .. }));
        }
    }
}

#[test]
fn states_round_trip_through_display() {
    for state in ALL_JOB_STATES {
        assert_eq!(state.to_string().parse::<JobState>().unwrap(), state);
    }
    for state in [
        AssignmentState::Submitted,
        AssignmentState::Approved,
        AssignmentState::Rejected,
        AssignmentState::Error,
    ] {
        assert_eq!(state.to_string().parse::<AssignmentState>().unwrap(), state);
    }
    assert!("paused".parse::<JobState>().is_err());
}

#[test]
fn task_names_match_the_wire_tag() {
    let tasks = [
        Task::LaunchTask { job_id: JobId::new() },
        Task::DisposeTask {
            remote_task_id: "T1".to_string(),
        },
        Task::OnJobFinished { job_id: JobId::new() },
        Task::SyncJobTask { job_id: JobId::new() },
        Task::PollResultsTask {
            remote_task_id: "T1".to_string(),
            remote_assignment_id: "A1".to_string(),
        },
    ];
    for task in tasks {
        let wire = serde_json::to_value(&task).unwrap();
        assert_eq!(wire["task"], task.name());
    }
}
