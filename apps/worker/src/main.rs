//! Drains the durable task queue. Today that means ending provider sessions
//! whose booked time is over.

use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shared_config::AppConfig;
use task_scheduler_cell::{RedisTaskQueue, TaskKind, TaskWorker, WorkerConfig};
use video_conferencing_cell::{EndSessionTaskHandler, ZoomClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    if !config.is_queue_configured() {
        anyhow::bail!("REDIS_URL must be set for the worker process");
    }

    let queue = Arc::new(
        RedisTaskQueue::new(&config)
            .await
            .context("failed to connect to the task queue")?,
    );
    let provider = Arc::new(ZoomClient::new(&config).context("video provider is not configured")?);

    let worker = Arc::new(
        TaskWorker::new(
            WorkerConfig {
                concurrency: config.worker_concurrency,
                ..Default::default()
            },
            queue,
        )
        .register(TaskKind::EndSession, Arc::new(EndSessionTaskHandler::new(provider))),
    );

    info!("Starting consult worker with {} loops", config.worker_concurrency);

    let running = tokio::spawn(worker.clone().start());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received, finishing in-flight tasks");
    worker.shutdown().await;

    match running.await {
        Ok(Ok(())) => info!("Worker stopped"),
        Ok(Err(e)) => error!("Worker stopped with error: {}", e),
        Err(e) => error!("Worker task panicked: {}", e),
    }

    Ok(())
}
