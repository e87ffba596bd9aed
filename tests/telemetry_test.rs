//! Integration tests for telemetry initialization and span helpers.

use crowdq::model::JobId;
use crowdq::queue::{Delivery, Task};

#[test]
fn telemetry_without_endpoint_logs_only() {
    let config = crowdq::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "crowdq-test".to_string(),
        log_level: "debug".to_string(),
    };
    // The global subscriber is process-wide, so a second install fails.
    if let Ok(guard) = crowdq::telemetry::init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn task_span_creates_and_records_outcome() {
    let delivery = Delivery {
        id: 7,
        read_count: 2,
        task: Task::LaunchTask {
            job_id: JobId::new(),
        },
    };
    let span = crowdq::telemetry::task::start_task_span(&delivery);
    crowdq::telemetry::task::record_state_transition(&span, "job", "launching", "running");
    crowdq::telemetry::task::record_outcome(&span, "ok");
}

#[test]
fn metric_instruments_build_without_provider() {
    use opentelemetry::KeyValue;

    crowdq::telemetry::metrics::job_transitions().add(
        1,
        &[
            KeyValue::new("event", "launch"),
            KeyValue::new("from", "new"),
            KeyValue::new("to", "launching"),
        ],
    );
    crowdq::telemetry::metrics::slots_extended().add(2, &[]);
    crowdq::telemetry::metrics::operation_duration_ms()
        .record(1.5, &[KeyValue::new("operation", "launch-task")]);
}
