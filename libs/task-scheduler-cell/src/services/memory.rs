use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::services::queue::LEASE_SECONDS;
use crate::{QueueStats, ScheduledTask, SchedulerError, TaskQueue, TaskStatus};

/// Process-local queue. Same contract as the Redis queue, nothing survives a restart.
#[derive(Default)]
pub struct InMemoryTaskQueue {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<String, ScheduledTask>,
    stats: QueueStats,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    async fn transition(
        &self,
        task_id: &str,
        target: TaskStatus,
        mutate: impl FnOnce(&mut ScheduledTask) + Send,
    ) -> Result<(), SchedulerError> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.to_string()))?;

        if !task.status.can_transition_to(&target) {
            return Err(SchedulerError::InvalidStatusTransition {
                from: format!("{:?}", task.status),
                to: format!("{:?}", target),
            });
        }

        task.status = target;
        task.updated_at = Utc::now();
        mutate(task);

        match target {
            TaskStatus::Completed => inner.stats.completed += 1,
            TaskStatus::Retrying => inner.stats.retried += 1,
            TaskStatus::Abandoned => inner.stats.abandoned += 1,
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: &ScheduledTask) -> Result<(), SchedulerError> {
        let mut inner = self.inner.lock().await;

        if let Some(existing) = inner.tasks.get(&task.task_id) {
            if existing.status == TaskStatus::Processing {
                debug!("Task {} is running, keeping current schedule", task.task_id);
                return Ok(());
            }
        }

        inner.tasks.insert(task.task_id.clone(), task.clone());
        inner.stats.scheduled += 1;
        Ok(())
    }

    async fn claim_due(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<ScheduledTask>, SchedulerError> {
        let mut inner = self.inner.lock().await;

        loop {
            let next_id = inner
                .tasks
                .values()
                .filter(|task| matches!(task.status, TaskStatus::Scheduled | TaskStatus::Retrying))
                .filter(|task| task.is_due(now))
                .min_by_key(|task| task.fire_at)
                .map(|task| task.task_id.clone());

            let Some(task_id) = next_id else {
                return Ok(None);
            };
            let Some(task) = inner.tasks.get_mut(&task_id) else {
                return Ok(None);
            };

            if task.attempts >= task.max_attempts {
                warn!(
                    "Task {} already used {}/{} attempts, abandoning",
                    task.task_id, task.attempts, task.max_attempts
                );
                task.status = TaskStatus::Abandoned;
                task.completed_at = Some(Utc::now());
                task.last_error = Some("attempts exhausted before claim".to_string());
                task.worker_id = None;
                task.updated_at = Utc::now();
                inner.stats.abandoned += 1;
                continue;
            }

            task.status = TaskStatus::Processing;
            task.attempts += 1;
            task.worker_id = Some(worker_id.to_string());
            task.updated_at = Utc::now();
            let claimed = task.clone();

            inner.stats.processing += 1;
            return Ok(Some(claimed));
        }
    }

    async fn complete(&self, task_id: &str) -> Result<(), SchedulerError> {
        self.transition(task_id, TaskStatus::Completed, |task| {
            task.completed_at = Some(Utc::now());
            task.last_error = None;
        })
        .await
    }

    async fn retry(&self, task_id: &str, error: String, next_fire_at: DateTime<Utc>) -> Result<(), SchedulerError> {
        self.transition(task_id, TaskStatus::Retrying, |task| {
            task.fire_at = next_fire_at;
            task.last_error = Some(error);
            task.worker_id = None;
        })
        .await
    }

    async fn abandon(&self, task_id: &str, error: String) -> Result<(), SchedulerError> {
        self.transition(task_id, TaskStatus::Abandoned, |task| {
            task.completed_at = Some(Utc::now());
            task.last_error = Some(error);
        })
        .await
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<ScheduledTask>, SchedulerError> {
        Ok(self.inner.lock().await.tasks.get(task_id).cloned())
    }

    /// A task claimed more than a lease ago is treated as stalled and made claimable again.
    async fn recover_stalled(&self, now: DateTime<Utc>) -> Result<u64, SchedulerError> {
        let mut inner = self.inner.lock().await;
        let lease = Duration::seconds(LEASE_SECONDS);

        let mut recovered = 0;
        for task in inner.tasks.values_mut() {
            if task.status == TaskStatus::Processing && task.updated_at + lease <= now {
                task.status = TaskStatus::Retrying;
                task.worker_id = None;
                recovered += 1;
            }
        }

        if recovered > 0 {
            warn!("Recovered {} stalled tasks", recovered);
        }
        Ok(recovered)
    }

    async fn stats(&self) -> QueueStats {
        self.inner.lock().await.stats.clone()
    }
}
