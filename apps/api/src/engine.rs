// apps/api/src/engine.rs
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use booking_cell::{
    BookingRepository, BookingService, ExpertDirectory, InMemoryBookingRepository, InMemoryExpertDirectory,
    PostgrestBookingRepository, PostgrestExpertDirectory,
};
use payment_cell::{InMemoryPaymentRecords, PayUnitClient, PaymentOrchestrator, PaymentRecordStore, PostgrestPaymentRecords};
use shared_config::AppConfig;
use task_scheduler_cell::{
    DeferredTaskScheduler, InMemoryTaskQueue, RedisTaskQueue, TaskKind, TaskQueue, TaskWorker, WorkerConfig,
};
use video_conferencing_cell::{
    EndSessionTaskHandler, InMemorySessionRepository, PostgrestSessionRepository, SessionManager, SessionRepository,
    VideoProvider, ZoomClient,
};

/// Services shared by every route, with adapters chosen from the configuration.
pub struct Engine {
    pub config: Arc<AppConfig>,
    pub bookings: Arc<BookingService>,
    pub payments: Arc<PaymentOrchestrator>,
    pub sessions: Arc<SessionManager>,
    /// Set when the task queue is in memory and must be drained by this process.
    pub local_worker: Option<Arc<TaskWorker>>,
}

impl Engine {
    pub async fn build(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let provider: Arc<dyn VideoProvider> =
            Arc::new(ZoomClient::new(&config).context("video provider is not configured")?);
        let gateway = Arc::new(PayUnitClient::new(&config).context("payment gateway is not configured")?);

        let (queue, local_worker): (Arc<dyn TaskQueue>, Option<Arc<TaskWorker>>) = if config.is_queue_configured() {
            let queue = RedisTaskQueue::new(&config)
                .await
                .context("failed to connect to the task queue")?;
            info!("Termination tasks go to Redis; run consult-worker to execute them");
            (Arc::new(queue), None)
        } else {
            warn!("REDIS_URL not set, termination tasks are kept in memory and lost on restart");
            let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryTaskQueue::new());
            let worker = TaskWorker::new(
                WorkerConfig {
                    worker_id: "api-local".to_string(),
                    concurrency: 1,
                    ..Default::default()
                },
                queue.clone(),
            )
            .register(TaskKind::EndSession, Arc::new(EndSessionTaskHandler::new(provider.clone())));
            (queue, Some(Arc::new(worker)))
        };

        let (booking_repo, directory, session_repo, records): (
            Arc<dyn BookingRepository>,
            Arc<dyn ExpertDirectory>,
            Arc<dyn SessionRepository>,
            Arc<dyn PaymentRecordStore>,
        ) = if config.is_configured() {
            (
                Arc::new(PostgrestBookingRepository::new(&config)),
                Arc::new(PostgrestExpertDirectory::new(&config)),
                Arc::new(PostgrestSessionRepository::new(&config)),
                Arc::new(PostgrestPaymentRecords::new(&config)),
            )
        } else {
            warn!("Storage not configured, using in-memory adapters");
            (
                Arc::new(InMemoryBookingRepository::new()),
                Arc::new(InMemoryExpertDirectory::new()),
                Arc::new(InMemorySessionRepository::new()),
                Arc::new(InMemoryPaymentRecords::new()),
            )
        };

        let sessions = Arc::new(SessionManager::new(
            provider,
            session_repo,
            DeferredTaskScheduler::new(queue),
        ));
        let bookings = Arc::new(BookingService::new(
            booking_repo,
            directory,
            sessions.clone(),
            config.platform_fee,
        ));
        let payments = Arc::new(PaymentOrchestrator::new(
            &config,
            bookings.clone(),
            gateway,
            records,
            sessions.clone(),
        ));

        Ok(Self {
            config,
            bookings,
            payments,
            sessions,
            local_worker,
        })
    }
}
