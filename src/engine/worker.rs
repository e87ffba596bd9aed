//! Task worker: receives queued tasks, routes them to the engine, retires
//! deliveries.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tokio::sync::Notify;
use tracing::{Instrument, error, info, warn};

use super::Engine;
use crate::error::Result;
use crate::queue::Task;
use crate::telemetry::metrics;
use crate::telemetry::task::{record_outcome, start_task_span};

/// Configuration for a task worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long to sleep when the queue is empty.
    pub poll_interval: Duration,
    /// Deliveries after which a retryable failure is dead-lettered.
    pub max_deliveries: i32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_deliveries: 5,
        }
    }
}

/// How one delivery was retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Retry,
    Dead,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Retry => "retry",
            Outcome::Dead => "dead",
        }
    }
}

/// The worker loop: receive a task, run it, ack or release the delivery.
pub struct TaskWorker {
    engine: Arc<Engine>,
    config: WorkerConfig,
    stopping: AtomicBool,
    shutdown: Notify,
}

impl TaskWorker {
    pub fn new(engine: Arc<Engine>, config: WorkerConfig) -> Self {
        Self {
            engine,
            config,
            stopping: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    /// Signal the worker to stop after the task in hand.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::Release);
        self.shutdown.notify_one();
    }

    /// Run until shutdown.
    pub async fn run(&self) -> Result<()> {
        info!("task worker started");

        while !self.stopping.load(Ordering::Acquire) {
            match self.process_next().await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => error!("process_next error: {e}"),
            }

            tokio::select! {
                _ = self.shutdown.notified() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("task worker shutting down");
        Ok(())
    }

    /// Handle deliveries until the queue has nothing ready. Returns how many
    /// were handled.
    pub async fn run_until_idle(&self) -> Result<usize> {
        let mut handled = 0;
        while self.process_next().await?.is_some() {
            handled += 1;
        }
        Ok(handled)
    }

    /// Receive and handle one delivery. `None` when the queue is empty.
    pub async fn process_next(&self) -> Result<Option<Outcome>> {
        let queue = self.engine.queue();
        let Some(delivery) = queue.receive().await? else {
            return Ok(None);
        };

        let span = start_task_span(&delivery);
        let task_name = delivery.task.name();
        let started = Instant::now();

        let result = self
            .execute(&delivery.task)
            .instrument(span.clone())
            .await;

        let outcome = match result {
            Ok(()) => {
                queue.ack(&delivery).await?;
                Outcome::Ok
            }
            Err(e) if e.is_retryable() && delivery.read_count < self.config.max_deliveries => {
                span.in_scope(|| {
                    warn!(
                        task = task_name,
                        attempt = delivery.read_count,
                        error = %e,
                        "task failed, will retry"
                    )
                });
                queue.retry(delivery).await?;
                Outcome::Retry
            }
            Err(e) => {
                span.in_scope(|| {
                    error!(
                        task = task_name,
                        attempt = delivery.read_count,
                        retryable = e.is_retryable(),
                        error = %e,
                        "task dead-lettered"
                    )
                });
                queue.ack(&delivery).await?;
                Outcome::Dead
            }
        };

        record_outcome(&span, outcome.as_str());
        metrics::tasks_processed().add(
            1,
            &[
                KeyValue::new("task", task_name),
                KeyValue::new("result", outcome.as_str()),
            ],
        );
        metrics::operation_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", task_name)],
        );
        Ok(Some(outcome))
    }

    async fn execute(&self, task: &Task) -> Result<()> {
        let engine = &self.engine;
        match task {
            Task::LaunchTask { job_id } => engine.launch_remote(*job_id).await.map(|_| ()),
            Task::DisposeTask { remote_task_id } => engine.dispose_remote(remote_task_id).await,
            Task::OnJobFinished { job_id } => engine.job_finished(*job_id).await,
            Task::ApproveTask { assignment_id } => engine
                .approve_assignment(*assignment_id, None)
                .await
                .map(|_| ()),
            Task::PollResultsTask {
                remote_task_id,
                remote_assignment_id,
            } => engine
                .poll_result(remote_task_id, remote_assignment_id)
                .await
                .map(|_| ()),
            Task::SyncJobTask { job_id } => engine.sync_job(*job_id).await.map(|_| ()),
        }
    }
}
