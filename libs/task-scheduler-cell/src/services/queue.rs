use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::{AsyncCommands, Script};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{QueueStats, ScheduledTask, SchedulerError, TaskStatus};
use shared_config::AppConfig;

const DUE_KEY: &str = "scheduled_tasks:due";
const PROCESSING_KEY: &str = "scheduled_tasks:processing";
const TASK_TTL_SECONDS: i64 = 604_800;
/// A claimed task whose lease expires goes back to the due set (worker crash).
pub(crate) const LEASE_SECONDS: i64 = 300;
const EXHAUSTED_ERROR: &str = "attempts exhausted before claim";

// Pops the earliest due id and leases it, in one step so two workers never share a task.
const CLAIM_SCRIPT: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 1)
if #ids == 0 then
  return false
end
redis.call('ZREM', KEYS[1], ids[1])
redis.call('ZADD', KEYS[2], ARGV[2], ids[1])
return ids[1]
"#;

// Moves expired leases back to the due set and marks them retrying, so a
// re-schedule is no longer skipped as running.
const RECOVER_SCRIPT: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
for _, id in ipairs(ids) do
  redis.call('ZREM', KEYS[1], id)
  redis.call('ZADD', KEYS[2], ARGV[1], id)
  redis.call('HSET', ARGV[2] .. id, 'status', ARGV[3])
end
return #ids
"#;

/// Storage seam between the scheduler (web process) and the worker process.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Stores `task` and makes it claimable from `task.fire_at`.
    /// A pending task with the same id is replaced; a running one is left alone.
    async fn enqueue(&self, task: &ScheduledTask) -> Result<(), SchedulerError>;

    /// Atomically claims the earliest task due at `now`, bumping its attempt count.
    async fn claim_due(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<ScheduledTask>, SchedulerError>;

    async fn complete(&self, task_id: &str) -> Result<(), SchedulerError>;

    async fn retry(&self, task_id: &str, error: String, next_fire_at: DateTime<Utc>) -> Result<(), SchedulerError>;

    async fn abandon(&self, task_id: &str, error: String) -> Result<(), SchedulerError>;

    async fn get_task(&self, task_id: &str) -> Result<Option<ScheduledTask>, SchedulerError>;

    /// Returns leased tasks whose lease expired to the due set, marked retrying.
    async fn recover_stalled(&self, _now: DateTime<Utc>) -> Result<u64, SchedulerError> {
        Ok(0)
    }

    async fn stats(&self) -> QueueStats;
}

const TASK_KEY_PREFIX: &str = "scheduled_task:";

fn task_key(task_id: &str) -> String {
    format!("{}{}", TASK_KEY_PREFIX, task_id)
}

pub struct RedisTaskQueue {
    pool: Pool,
    stats: Arc<RwLock<QueueStats>>,
    claim_script: Script,
    recover_script: Script,
}

impl RedisTaskQueue {
    pub async fn new(config: &AppConfig) -> Result<Self, SchedulerError> {
        let redis_url = config
            .redis_url
            .clone()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            SchedulerError::RedisError(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "Failed to create Redis pool",
                format!("Pool creation error: {}", e),
            )))
        })?;

        let queue = Self {
            pool,
            stats: Arc::new(RwLock::new(QueueStats::default())),
            claim_script: Script::new(CLAIM_SCRIPT),
            recover_script: Script::new(RECOVER_SCRIPT),
        };

        let mut conn = queue.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis task queue initialized successfully");

        Ok(queue)
    }

    async fn get_connection(&self) -> Result<Connection, SchedulerError> {
        self.pool.get().await.map_err(|e| {
            SchedulerError::RedisError(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "Failed to get Redis connection",
                e.to_string(),
            )))
        })
    }

    /// The `status` field wins over the copy inside `data`; recovery only rewrites the field.
    async fn load(&self, conn: &mut Connection, task_id: &str) -> Result<Option<ScheduledTask>, SchedulerError> {
        let (data, status): (Option<String>, Option<String>) =
            conn.hget(task_key(task_id), &["data", "status"][..]).await?;
        let Some(raw) = data else {
            return Ok(None);
        };

        let mut task: ScheduledTask = serde_json::from_str(&raw)?;
        if let Some(status) = status {
            task.status = serde_json::from_str(&status)?;
        }
        Ok(Some(task))
    }

    async fn store(&self, conn: &mut Connection, task: &ScheduledTask) -> Result<(), SchedulerError> {
        let key = task_key(&task.task_id);
        let data = serde_json::to_string(task)?;
        let status = serde_json::to_string(&task.status)?;
        let fire_at = task.fire_at.to_rfc3339();
        let _: () = conn
            .hset_multiple(
                &key,
                &[
                    ("data", data.as_str()),
                    ("status", status.as_str()),
                    ("fire_at", fire_at.as_str()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn transition(
        &self,
        task_id: &str,
        target: TaskStatus,
        mutate: impl FnOnce(&mut ScheduledTask) + Send,
    ) -> Result<ScheduledTask, SchedulerError> {
        let mut conn = self.get_connection().await?;
        let mut task = self
            .load(&mut conn, task_id)
            .await?
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.to_string()))?;

        if !task.status.can_transition_to(&target) {
            return Err(SchedulerError::InvalidStatusTransition {
                from: format!("{:?}", task.status),
                to: format!("{:?}", target),
            });
        }

        task.status = target;
        task.updated_at = Utc::now();
        mutate(&mut task);
        self.store(&mut conn, &task).await?;

        let _: () = conn.zrem(PROCESSING_KEY, task_id).await?;
        if target.is_terminal() {
            let _: () = conn.expire(task_key(task_id), TASK_TTL_SECONDS).await?;
        } else {
            let _: () = conn
                .zadd(DUE_KEY, task_id, task.fire_at.timestamp_millis())
                .await?;
        }

        Ok(task)
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, task: &ScheduledTask) -> Result<(), SchedulerError> {
        let mut conn = self.get_connection().await?;

        if let Some(existing) = self.load(&mut conn, &task.task_id).await? {
            if existing.status == TaskStatus::Processing {
                debug!("Task {} is running, keeping current schedule", task.task_id);
                return Ok(());
            }
        }

        self.store(&mut conn, task).await?;
        let _: () = conn.persist(task_key(&task.task_id)).await?;
        let _: () = conn
            .zadd(DUE_KEY, &task.task_id, task.fire_at.timestamp_millis())
            .await?;

        self.stats.write().await.scheduled += 1;
        debug!("Task {} enqueued for {}", task.task_id, task.fire_at);
        Ok(())
    }

    async fn claim_due(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<ScheduledTask>, SchedulerError> {
        let mut conn = self.get_connection().await?;
        let lease_until = now + Duration::seconds(LEASE_SECONDS);

        loop {
            let claimed: Option<String> = self
                .claim_script
                .key(DUE_KEY)
                .key(PROCESSING_KEY)
                .arg(now.timestamp_millis())
                .arg(lease_until.timestamp_millis())
                .invoke_async(&mut conn)
                .await?;

            let Some(task_id) = claimed else {
                return Ok(None);
            };

            let Some(mut task) = self.load(&mut conn, &task_id).await? else {
                warn!("Claimed task {} has no stored data, dropping it", task_id);
                let _: () = conn.zrem(PROCESSING_KEY, &task_id).await?;
                continue;
            };

            // A task recovered after its last allowed attempt must not run again.
            if task.attempts >= task.max_attempts {
                warn!(
                    "Task {} already used {}/{} attempts, abandoning",
                    task.task_id, task.attempts, task.max_attempts
                );
                task.status = TaskStatus::Abandoned;
                task.completed_at = Some(Utc::now());
                task.last_error = Some(EXHAUSTED_ERROR.to_string());
                task.worker_id = None;
                task.updated_at = Utc::now();
                self.store(&mut conn, &task).await?;
                let _: () = conn.zrem(PROCESSING_KEY, &task_id).await?;
                let _: () = conn.expire(task_key(&task_id), TASK_TTL_SECONDS).await?;
                self.stats.write().await.abandoned += 1;
                continue;
            }

            task.status = TaskStatus::Processing;
            task.attempts += 1;
            task.worker_id = Some(worker_id.to_string());
            task.updated_at = Utc::now();
            self.store(&mut conn, &task).await?;

            self.stats.write().await.processing += 1;
            debug!("Task {} claimed by {} (attempt {})", task.task_id, worker_id, task.attempts);
            return Ok(Some(task));
        }
    }

    async fn complete(&self, task_id: &str) -> Result<(), SchedulerError> {
        self.transition(task_id, TaskStatus::Completed, |task| {
            task.completed_at = Some(Utc::now());
            task.last_error = None;
        })
        .await?;
        self.stats.write().await.completed += 1;
        Ok(())
    }

    async fn retry(&self, task_id: &str, error: String, next_fire_at: DateTime<Utc>) -> Result<(), SchedulerError> {
        self.transition(task_id, TaskStatus::Retrying, |task| {
            task.fire_at = next_fire_at;
            task.last_error = Some(error);
            task.worker_id = None;
        })
        .await?;
        self.stats.write().await.retried += 1;
        Ok(())
    }

    async fn abandon(&self, task_id: &str, error: String) -> Result<(), SchedulerError> {
        self.transition(task_id, TaskStatus::Abandoned, |task| {
            task.completed_at = Some(Utc::now());
            task.last_error = Some(error);
        })
        .await?;
        self.stats.write().await.abandoned += 1;
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<ScheduledTask>, SchedulerError> {
        let mut conn = self.get_connection().await?;
        self.load(&mut conn, task_id).await
    }

    async fn recover_stalled(&self, now: DateTime<Utc>) -> Result<u64, SchedulerError> {
        let mut conn = self.get_connection().await?;
        let recovered: u64 = self
            .recover_script
            .key(PROCESSING_KEY)
            .key(DUE_KEY)
            .arg(now.timestamp_millis())
            .arg(TASK_KEY_PREFIX)
            .arg(serde_json::to_string(&TaskStatus::Retrying)?)
            .invoke_async(&mut conn)
            .await?;

        if recovered > 0 {
            warn!("Recovered {} stalled tasks", recovered);
        }
        Ok(recovered)
    }

    async fn stats(&self) -> QueueStats {
        self.stats.read().await.clone()
    }
}
