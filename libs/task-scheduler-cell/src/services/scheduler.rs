use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use crate::{EndSessionPayload, ScheduledTask, SchedulerError, TaskKind, TaskQueue};

/// Web-process side of the queue: turns "do X at time T" into a stored task.
#[derive(Clone)]
pub struct DeferredTaskScheduler {
    queue: Arc<dyn TaskQueue>,
}

impl DeferredTaskScheduler {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> Arc<dyn TaskQueue> {
        self.queue.clone()
    }

    /// Schedules termination of a provider meeting. Calling this again for the
    /// same meeting moves the pending task instead of adding a second one.
    #[instrument(skip(self))]
    pub async fn schedule_end_session(
        &self,
        meeting_id: i64,
        fire_at: DateTime<Utc>,
    ) -> Result<String, SchedulerError> {
        self.schedule(
            ScheduledTask::end_session_id(meeting_id),
            TaskKind::EndSession,
            &EndSessionPayload { meeting_id },
            fire_at,
        )
        .await
    }

    pub async fn schedule<P: Serialize>(
        &self,
        task_id: String,
        kind: TaskKind,
        payload: &P,
        fire_at: DateTime<Utc>,
    ) -> Result<String, SchedulerError> {
        if fire_at < Utc::now() {
            return Err(SchedulerError::InvalidFireTime { fire_at });
        }

        let payload = serde_json::to_value(payload)?;
        let task = ScheduledTask::new(task_id, kind, payload, fire_at);
        self.queue.enqueue(&task).await?;

        info!("Scheduled {} task {} for {}", kind, task.task_id, fire_at);
        Ok(task.task_id)
    }
}
