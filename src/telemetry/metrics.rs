//! Metric instrument factories for crowdq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"crowdq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for crowdq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("crowdq")
}

/// Counter: jobs created.
/// Labels: `job_type`.
pub fn jobs_created() -> Counter<u64> {
    meter()
        .u64_counter("crowdq.jobs.created")
        .with_description("Number of jobs created")
        .build()
}

/// Counter: job state transitions.
/// Labels: `event`, `from`, `to`.
pub fn job_transitions() -> Counter<u64> {
    meter()
        .u64_counter("crowdq.jobs.transitions")
        .with_description("Number of job state transitions")
        .build()
}

/// Counter: assignment state transitions.
/// Labels: `event`, `to`.
pub fn assignment_transitions() -> Counter<u64> {
    meter()
        .u64_counter("crowdq.assignments.transitions")
        .with_description("Number of assignment state transitions")
        .build()
}

/// Counter: assignment ingestion attempts.
/// Labels: `result` ("created" | "duplicate").
pub fn assignments_ingested() -> Counter<u64> {
    meter()
        .u64_counter("crowdq.assignments.ingested")
        .with_description("Number of assignment ingestion attempts")
        .build()
}

/// Counter: assignment slots granted by extensions.
pub fn slots_extended() -> Counter<u64> {
    meter()
        .u64_counter("crowdq.jobs.slots_extended")
        .with_description("Assignment slots added to running jobs")
        .build()
}

/// Counter: compare-and-set conflicts that forced a re-read.
/// Labels: `record`.
pub fn write_conflicts() -> Counter<u64> {
    meter()
        .u64_counter("crowdq.store.write_conflicts")
        .with_description("Number of lost compare-and-set writes")
        .build()
}

/// Counter: queue-level operations (send, read, archive, set_vt).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("crowdq.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: task deliveries handled by workers.
/// Labels: `task`, `result` ("ok" | "retry" | "dead").
pub fn tasks_processed() -> Counter<u64> {
    meter()
        .u64_counter("crowdq.tasks.processed")
        .with_description("Number of task deliveries handled")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("crowdq.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
