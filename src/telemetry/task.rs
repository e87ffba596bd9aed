//! Task execution span helpers.
//!
//! Provides span creation and state-transition recording for queued tasks
//! and the records they move.

use tracing::Span;

use crate::queue::Delivery;

/// Start a span for one task delivery.
///
/// The `task.outcome` field is declared empty and filled by
/// [`record_outcome`].
pub fn start_task_span(delivery: &Delivery) -> Span {
    tracing::info_span!(
        "task.execute",
        "task.name" = delivery.task.name(),
        "task.delivery" = delivery.id,
        "task.attempt" = delivery.read_count,
        "task.outcome" = tracing::field::Empty,
    )
}

/// Record how a delivery ended ("ok", "retry", "dead").
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("task.outcome", outcome);
}

/// Record a state transition event on the given span.
///
/// Emits a tracing `info` event scoped to the span.
pub fn record_state_transition(span: &Span, record: &str, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::info!(record, from, to, "state_transition");
    });
}
