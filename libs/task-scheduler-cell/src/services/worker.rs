use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, instrument, warn};

use crate::{ScheduledTask, SchedulerError, TaskKind, TaskQueue, WorkerConfig};

/// Executes one kind of task. An `Err` counts as a failed attempt.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &ScheduledTask) -> Result<(), SchedulerError>;
}

/// What happened to a claimed task on this attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Retrying,
    Abandoned,
}

pub struct TaskWorker {
    config: WorkerConfig,
    queue: Arc<dyn TaskQueue>,
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
    is_shutdown: Arc<RwLock<bool>>,
}

impl TaskWorker {
    pub fn new(config: WorkerConfig, queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            config,
            queue,
            handlers: HashMap::new(),
            is_shutdown: Arc::new(RwLock::new(false)),
        }
    }

    pub fn register(mut self, kind: TaskKind, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn start(self: Arc<Self>) -> Result<(), SchedulerError> {
        info!(
            "Starting task worker {} with {} loops",
            self.config.worker_id, self.config.concurrency
        );

        let mut handles = Vec::new();

        for i in 0..self.config.concurrency.max(1) {
            let worker = self.clone();
            let worker_name = format!("{}-{}", self.config.worker_id, i);
            handles.push(tokio::spawn(async move { worker.worker_loop(worker_name).await }));
        }

        let stats_worker = self.clone();
        handles.push(tokio::spawn(async move { stats_worker.stats_loop().await }));

        futures::future::join_all(handles).await;
        info!("Task worker {} stopped", self.config.worker_id);
        Ok(())
    }

    /// Signals every loop to stop after its current task.
    pub async fn shutdown(&self) {
        info!("Initiating shutdown for task worker {}", self.config.worker_id);
        *self.is_shutdown.write().await = true;
    }

    async fn worker_loop(&self, worker_name: String) {
        debug!("Worker loop started: {}", worker_name);
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if *self.is_shutdown.read().await {
                debug!("Worker {} received shutdown signal", worker_name);
                break;
            }

            match self.run_once(&worker_name).await {
                Ok(Some(_)) => {}
                Ok(None) => tokio::time::sleep(poll_interval).await,
                Err(e) => {
                    error!("Worker {} failed to claim task: {}", worker_name, e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }

        debug!("Worker loop ended: {}", worker_name);
    }

    /// Claims and runs at most one due task. `Ok(None)` means nothing was due.
    pub async fn run_once(&self, worker_name: &str) -> Result<Option<TaskOutcome>, SchedulerError> {
        match self.queue.claim_due(worker_name, Utc::now()).await? {
            Some(task) => self.process_task(task, worker_name).await.map(Some),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, task), fields(task_id = %task.task_id, kind = %task.kind))]
    async fn process_task(&self, task: ScheduledTask, worker_name: &str) -> Result<TaskOutcome, SchedulerError> {
        debug!("Worker {} running task (attempt {})", worker_name, task.attempts);

        let Some(handler) = self.handlers.get(&task.kind).cloned() else {
            let err = SchedulerError::NoHandler(task.kind.to_string());
            error!("Abandoning task {}: {}", task.task_id, err);
            self.queue.abandon(&task.task_id, err.to_string()).await?;
            return Ok(TaskOutcome::Abandoned);
        };

        let attempt_timeout = Duration::from_secs(task.timeout_seconds);
        let result = match timeout(attempt_timeout, handler.handle(&task)).await {
            Ok(result) => result,
            Err(_) => Err(SchedulerError::TaskTimeout {
                timeout_seconds: task.timeout_seconds,
            }),
        };

        match result {
            Ok(()) => {
                self.queue.complete(&task.task_id).await?;
                info!("Task {} completed", task.task_id);
                Ok(TaskOutcome::Completed)
            }
            Err(e) if task.can_retry() => {
                let next_fire_at = Utc::now() + chrono::Duration::seconds(self.config.retry_delay_seconds as i64);
                warn!(
                    "Task {} failed on attempt {}/{}: {}, retrying at {}",
                    task.task_id, task.attempts, task.max_attempts, e, next_fire_at
                );
                self.queue.retry(&task.task_id, e.to_string(), next_fire_at).await?;
                Ok(TaskOutcome::Retrying)
            }
            Err(e) => {
                let exhausted = SchedulerError::AttemptsExhausted {
                    task_id: task.task_id.clone(),
                    max_attempts: task.max_attempts,
                };
                error!("{}: {}", exhausted, e);
                self.queue.abandon(&task.task_id, e.to_string()).await?;
                Ok(TaskOutcome::Abandoned)
            }
        }
    }

    async fn stats_loop(&self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.stats_interval_seconds.max(1)));

        loop {
            interval.tick().await;

            if *self.is_shutdown.read().await {
                break;
            }

            if let Err(e) = self.queue.recover_stalled(Utc::now()).await {
                error!("Failed to recover stalled tasks: {}", e);
            }

            let stats = self.queue.stats().await;
            info!(
                scheduled = stats.scheduled,
                processing = stats.processing,
                completed = stats.completed,
                retried = stats.retried,
                abandoned = stats.abandoned,
                "Task worker stats"
            );
        }
    }
}
