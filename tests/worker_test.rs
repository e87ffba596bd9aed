//! Task worker delivery handling.

use std::sync::Arc;
use std::time::Duration;

use crowdq::engine::{Engine, Outcome, TaskWorker, WorkerConfig};
use crowdq::job_type::JobTypeRegistry;
use crowdq::marketplace::SandboxMarketplace;
use crowdq::model::{AssignmentId, JobId, JobState, NewJob};
use crowdq::queue::{MemoryQueue, Task, TaskQueue};
use crowdq::store::MemoryStore;
use serde_json::json;

fn setup() -> (Arc<Engine>, Arc<MemoryQueue>, Arc<SandboxMarketplace>) {
    let queue = Arc::new(MemoryQueue::new());
    let market = Arc::new(SandboxMarketplace::new());
    let engine = Arc::new(Engine::new(
        Arc::new(MemoryStore::new()),
        queue.clone(),
        market.clone(),
        Arc::new(JobTypeRegistry::empty()),
    ));
    (engine, queue, market)
}

fn worker(engine: &Arc<Engine>, max_deliveries: i32) -> TaskWorker {
    TaskWorker::new(
        Arc::clone(engine),
        WorkerConfig {
            poll_interval: Duration::from_millis(10),
            max_deliveries,
        },
    )
}

#[tokio::test]
async fn empty_queue_yields_nothing() {
    let (engine, _, _) = setup();
    let worker = worker(&engine, 3);
    assert_eq!(worker.process_next().await.unwrap(), None);
    assert_eq!(worker.run_until_idle().await.unwrap(), 0);
}

#[tokio::test]
async fn deterministic_failures_are_dead_lettered_immediately() {
    let (engine, queue, _) = setup();
    let worker = worker(&engine, 3);

    queue
        .enqueue(&Task::ApproveTask {
            assignment_id: AssignmentId::new(),
        })
        .await
        .unwrap();
    assert_eq!(worker.process_next().await.unwrap(), Some(Outcome::Dead));
    assert!(queue.is_empty().await);
}

#[tokio::test]
async fn transient_failures_retry_until_max_deliveries() {
    let (engine, queue, market) = setup();
    let worker = worker(&engine, 3);

    let job = engine
        .create_job(NewJob::new("survey", json!({"form": 1})).title("Survey"))
        .await
        .unwrap();
    market.set_unavailable(true).await;

    let mut outcomes = Vec::new();
    while let Some(outcome) = worker.process_next().await.unwrap() {
        outcomes.push(outcome);
    }
    assert_eq!(outcomes, vec![Outcome::Retry, Outcome::Retry, Outcome::Dead]);
    assert!(queue.is_empty().await);
    assert_eq!(
        engine.get_job(job.id).await.unwrap().state,
        JobState::Launching
    );
}

#[tokio::test]
async fn a_retried_delivery_can_succeed() {
    let (engine, queue, market) = setup();
    let worker = worker(&engine, 3);

    let job = engine
        .create_job(NewJob::new("survey", json!({"form": 1})).title("Survey"))
        .await
        .unwrap();
    market.set_unavailable(true).await;
    assert_eq!(worker.process_next().await.unwrap(), Some(Outcome::Retry));

    market.set_unavailable(false).await;
    assert_eq!(worker.process_next().await.unwrap(), Some(Outcome::Ok));
    assert!(queue.is_empty().await);
    assert_eq!(
        engine.get_job(job.id).await.unwrap().state,
        JobState::Running
    );
}

#[tokio::test]
async fn tasks_for_missing_records_are_harmless() {
    let (engine, queue, _) = setup();
    let worker = worker(&engine, 3);

    queue
        .enqueue(&Task::DisposeTask {
            remote_task_id: "T404".to_string(),
        })
        .await
        .unwrap();
    queue
        .enqueue(&Task::PollResultsTask {
            remote_task_id: "T404".to_string(),
            remote_assignment_id: "A404".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(worker.process_next().await.unwrap(), Some(Outcome::Ok));
    assert_eq!(worker.process_next().await.unwrap(), Some(Outcome::Ok));

    queue
        .enqueue(&Task::SyncJobTask {
            job_id: JobId::new(),
        })
        .await
        .unwrap();
    assert_eq!(worker.process_next().await.unwrap(), Some(Outcome::Dead));
}

#[tokio::test]
async fn run_stops_on_shutdown() {
    let (engine, queue, _) = setup();
    let worker = Arc::new(worker(&engine, 3));

    engine
        .create_job(NewJob::new("survey", json!({"form": 1})).title("Survey"))
        .await
        .unwrap();

    let running = Arc::clone(&worker);
    let handle = tokio::spawn(async move { running.run().await });

    for _ in 0..100 {
        if queue.is_empty().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(queue.is_empty().await);

    worker.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn memory_queue_redelivers_retried_tasks_with_a_higher_read_count() {
    let queue = MemoryQueue::new();
    let task = Task::SyncJobTask { job_id: JobId::new() };
    queue.enqueue(&task).await.unwrap();

    let first = queue.receive().await.unwrap().unwrap();
    assert_eq!(first.read_count, 1);
    assert!(queue.receive().await.unwrap().is_none());
    assert_eq!(queue.pending().await, vec![task.clone()]);

    queue.retry(first).await.unwrap();
    let second = queue.receive().await.unwrap().unwrap();
    assert_eq!(second.read_count, 2);
    assert_eq!(second.task, task);

    queue.ack(&second).await.unwrap();
    assert!(queue.is_empty().await);
}
