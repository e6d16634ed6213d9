//! `toolgate-worker`: serves client-side tool queues over Redis.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use toolgate_core::{Keyspace, Settings, WorkflowBackend};
use toolgate_workflow::cli::WorkerCli;
use toolgate_workflow::{ActivityWorker, PlaceholderActivity, RedisWorkflowEngine, WorkerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = WorkerCli::parse();
    let settings = Settings::from_env().context("invalid TOOLGATE_* settings")?;
    if settings.workflow != WorkflowBackend::Redis {
        bail!("toolgate-worker needs TOOLGATE_WORKFLOW=redis");
    }
    let Some(redis_url) = settings.redis_url.as_deref() else {
        bail!("TOOLGATE_REDIS_URL is not set");
    };

    let config = WorkerConfig::load(&cli.config).await?;
    let keyspace = Keyspace::new(settings.env.clone(), settings.app_name.clone());
    let engine = RedisWorkflowEngine::connect(redis_url, &keyspace).await?;

    let worker = ActivityWorker::new(
        Arc::new(engine),
        Arc::new(PlaceholderActivity),
        config.task_queues(),
    )
    .with_poll(Duration::from_secs(cli.poll_secs.max(1)));

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
        }
        signal.cancel();
    });

    tracing::info!(profile = %config.profileid, queues = config.queues.len(), "Starting worker");
    worker.run(cancel).await;
    Ok(())
}
