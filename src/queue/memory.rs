//! In-process task queue for tests and single-process deployments.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Delivery, Task, TaskQueue};
use crate::error::Result;

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    ready: VecDeque<Delivery>,
    in_flight: HashMap<i64, Delivery>,
}

/// FIFO queue held in memory. Received-but-unacked tasks stay in flight until
/// acked or retried.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks not yet acknowledged: ready first, then in flight.
    pub async fn pending(&self) -> Vec<Task> {
        let inner = self.inner.lock().await;
        let mut in_flight: Vec<&Delivery> = inner.in_flight.values().collect();
        in_flight.sort_by_key(|d| d.id);
        inner
            .ready
            .iter()
            .chain(in_flight)
            .map(|d| d.task.clone())
            .collect()
    }

    /// Drop everything, returning the tasks that were ready.
    pub async fn drain(&self) -> Vec<Task> {
        let mut inner = self.inner.lock().await;
        inner.in_flight.clear();
        inner.ready.drain(..).map(|d| d.task).collect()
    }

    pub async fn is_empty(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.ready.is_empty() && inner.in_flight.is_empty()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(&self, task: &Task) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.ready.push_back(Delivery {
            id,
            read_count: 0,
            task: task.clone(),
        });
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>> {
        let mut inner = self.inner.lock().await;
        let Some(mut delivery) = inner.ready.pop_front() else {
            return Ok(None);
        };
        delivery.read_count += 1;
        inner.in_flight.insert(delivery.id, delivery.clone());
        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.inner.lock().await.in_flight.remove(&delivery.id);
        Ok(())
    }

    async fn retry(&self, delivery: Delivery) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(held) = inner.in_flight.remove(&delivery.id) {
            inner.ready.push_back(held);
        }
        Ok(())
    }
}
