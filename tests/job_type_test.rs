//! Job type configuration, defaults and hook dispatch.

use std::sync::{Arc, Mutex};

use crowdq::error::Error;
use crowdq::job_type::{AssignmentEventType, JobDefaults, JobType, JobTypeRegistry};
use crowdq::model::{
    Assignment, AssignmentState, DEFAULT_ASSIGNMENT_DURATION_SECS, DEFAULT_LIFETIME_SECS, JobState,
    NewJob, QuestionKind,
};
use serde_json::json;

#[test]
fn crate_defaults_apply_when_nothing_is_configured() {
    let job = JobType::new("plain")
        .build_job(NewJob::new("plain", json!({"q": 1})).title("Plain"))
        .unwrap();
    assert_eq!(job.state, JobState::New);
    assert_eq!(job.version, 0);
    assert_eq!(job.target_assignment_count, 1);
    assert_eq!(job.required_approved_count, 0);
    assert_eq!(job.lifetime_secs, DEFAULT_LIFETIME_SECS);
    assert_eq!(job.assignment_duration_secs, DEFAULT_ASSIGNMENT_DURATION_SECS);
    assert_eq!(job.question_kind, QuestionKind::External);
    assert!(job.remote_task_id.is_none());
}

#[test]
fn caller_values_win_over_type_defaults() {
    let job_type = JobType::new("tagging")
        .defaults(JobDefaults {
            title: Some("Tag this image".to_string()),
            reward_cents: Some(5),
            target_assignment_count: Some(3),
            keywords: Some(vec!["image".to_string()]),
            ..JobDefaults::default()
        })
        .qualification("approval_rate", json!({"min": 95}));

    let job = job_type
        .build_job(
            NewJob::new("tagging", json!({"url": "x"}))
                .reward_cents(12)
                .keywords(["cats", "dogs"]),
        )
        .unwrap();
    assert_eq!(job.title, "Tag this image");
    assert_eq!(job.reward_cents, 12);
    assert_eq!(job.target_assignment_count, 3);
    assert_eq!(job.keywords, vec!["cats", "dogs"]);
    assert_eq!(job.qualifications.len(), 1);
    assert_eq!(job.qualifications[0].kind, "approval_rate");
}

#[test]
fn require_all_approved_tracks_the_target() {
    let job = JobType::new("t")
        .build_job(
            NewJob::new("t", json!({}))
                .target_assignments(4)
                .require_all_approved(),
        )
        .unwrap();
    assert_eq!(job.required_approved_count, 4);

    let from_defaults = JobType::new("t")
        .defaults(JobDefaults {
            target_assignment_count: Some(2),
            require_all_approved: true,
            ..JobDefaults::default()
        })
        .build_job(NewJob::new("t", json!({})))
        .unwrap();
    assert_eq!(from_defaults.required_approved_count, 2);
}

#[test]
fn invalid_counts_are_rejected() {
    let zero = JobType::new("t").build_job(NewJob::new("t", json!({})).target_assignments(0));
    assert!(matches!(zero, Err(Error::InvalidJob(_))));

    let too_many = JobType::new("t").build_job(
        NewJob::new("t", json!({}))
            .target_assignments(2)
            .required_approved(3),
    );
    assert!(matches!(too_many, Err(Error::InvalidJob(_))));
}

#[test]
fn handlers_run_in_registration_order_per_event() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let (a, b, c) = (calls.clone(), calls.clone(), calls.clone());
    let job_type = JobType::new("ordered")
        .on_assignment_approved(move |_, _| {
            a.lock().unwrap().push("first");
            Ok(())
        })
        .on_assignment_approved(move |_, _| {
            b.lock().unwrap().push("second");
            Ok(())
        })
        .on_assignment_rejected(move |_, _| {
            c.lock().unwrap().push("rejected");
            Ok(())
        });

    let job = job_type
        .build_job(NewJob::new("ordered", json!({})).title("x"))
        .unwrap();
    let assignment = Assignment::submitted(job.id, "A1", "W1", json!({}));

    job_type
        .hooks()
        .dispatch(AssignmentEventType::Approved, &job, &assignment)
        .unwrap();
    assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);
    assert_eq!(job_type.hooks().handler_count(AssignmentEventType::Submitted), 0);
}

#[test]
fn handler_failure_stops_dispatch_and_propagates() {
    let ran_after = Arc::new(Mutex::new(false));
    let flag = ran_after.clone();
    let job_type = JobType::new("failing")
        .on_assignment_submitted(|_, _| Err("downstream unavailable".into()))
        .on_assignment_submitted(move |_, _| {
            *flag.lock().unwrap() = true;
            Ok(())
        });
    let job = job_type
        .build_job(NewJob::new("failing", json!({})).title("x"))
        .unwrap();
    let assignment = Assignment::submitted(job.id, "A1", "W1", json!({}));

    let err = job_type
        .hooks()
        .dispatch(AssignmentEventType::Submitted, &job, &assignment)
        .unwrap_err();
    match err {
        Error::Hook { event, source } => {
            assert_eq!(event, "submitted");
            assert_eq!(source.to_string(), "downstream unavailable");
        }
        other => panic!("expected hook error, got {other:?}"),
    }
    assert!(!*ran_after.lock().unwrap());
}

#[test]
fn error_state_has_no_dispatch_event() {
    assert_eq!(AssignmentEventType::for_state(AssignmentState::Error), None);
    assert_eq!(
        AssignmentEventType::for_state(AssignmentState::Rejected),
        Some(AssignmentEventType::Rejected)
    );
}

#[test]
fn registry_loads_toml_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("tagging.toml"),
        r#"
[job_type]
name = "tagging"
auto_approve = true

[job_type.defaults]
title = "Tag images"
reward_cents = 7
target_assignment_count = 3
required_approved_count = 2
question_kind = "question_form"

[[job_type.qualifications]]
kind = "locale"
params = { country = "US" }
"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("README.md"), "not a job type").unwrap();

    let registry = JobTypeRegistry::load_from_dir(dir.path()).unwrap();
    assert_eq!(registry.names(), vec!["tagging"]);

    let tagging = registry.get("tagging").unwrap();
    assert!(tagging.auto_approve);
    assert_eq!(tagging.qualifications[0].params, json!({"country": "US"}));

    let job = tagging
        .build_job(NewJob::new("tagging", json!({"url": "x"})))
        .unwrap();
    assert_eq!(job.title, "Tag images");
    assert_eq!(job.reward_cents, 7);
    assert_eq!(job.target_assignment_count, 3);
    assert_eq!(job.required_approved_count, 2);
    assert_eq!(job.question_kind, QuestionKind::QuestionForm);
}

#[test]
fn registry_rejects_malformed_toml() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bad.toml"), "[job_type]\nauto_approve = 3\n").unwrap();
    assert!(matches!(
        JobTypeRegistry::load_from_dir(dir.path()),
        Err(Error::Config(_))
    ));
}

#[test]
fn unknown_job_types_resolve_to_an_empty_configuration() {
    let registry = JobTypeRegistry::empty();
    assert!(registry.get("nope").is_none());
    let resolved = registry.resolve("nope");
    assert_eq!(resolved.name, "nope");
    assert!(!resolved.auto_approve);
}

#[test]
fn job_type_debug_reports_handler_counts() {
    let job_type = JobType::new("tagging")
        .auto_approve(true)
        .on_assignment_approved(|_, _| Ok(()))
        .on_job_finished(|_| Ok(()))
        .on_job_finished(|_| Ok(()));

    let rendered = format!("{job_type:?}");
    assert!(rendered.contains("name: \"tagging\""), "{rendered}");
    assert!(rendered.contains("auto_approve: true"), "{rendered}");
    assert!(rendered.contains("finished_hooks: 2"), "{rendered}");

    let mut registry = JobTypeRegistry::empty();
    registry.register(job_type);
    assert!(format!("{registry:?}").contains("tagging"));
}
