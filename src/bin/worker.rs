use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use satchel::blobs::FsBlobStore;
use satchel::config::Config;
use satchel::feeds::HttpFeedFetcher;
use satchel::fetch::PageFetcher;
use satchel::jobs::{
    CacheImageJobHandler, EnrichJobHandler, JobQueue, JobRegistry, PgWorkSink, QueueWorker,
    WorkerConfig,
};
use satchel::poller::FeedPoller;
use satchel::render::{RenderClient, RenderConfig};
use satchel::store::PgStoreProvider;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(config.database_url())
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let provider = Arc::new(PgStoreProvider::new(pool.clone()));
    let render = Arc::new(RenderClient::new(RenderConfig {
        enabled: config.render_enabled(),
        account_id: config.render_account_id().to_string(),
        api_token: config.render_api_token().to_string(),
        timeout: Duration::from_millis(config.render_timeout_ms()),
        api_base: config.render_api_base().to_string(),
    })?);
    let blobs = Arc::new(FsBlobStore::new(config.blob_root()));

    let mut registry = JobRegistry::new();
    registry.register(EnrichJobHandler::new(provider.clone(), render.clone()));
    registry.register(CacheImageJobHandler::new(
        provider.clone(),
        blobs,
        reqwest::Client::new(),
    ));

    let poller = FeedPoller::new(
        provider,
        Arc::new(HttpFeedFetcher::new()?),
        Arc::new(PageFetcher::new()?),
        Arc::new(PgWorkSink::new(pool.clone())),
        config.enrich_threshold(),
    );
    let poll_batch_size = config.poll_batch_size();
    let poll_interval = Duration::from_secs(config.poll_interval_secs());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            match poller.poll_due(poll_batch_size).await {
                Ok(results) => {
                    let failed = results.iter().filter(|r| !r.success).count();
                    info!(polled = results.len(), failed, "feed poll pass finished");
                }
                Err(e) => error!(error = %e, "feed poll pass failed"),
            }
        }
    });

    let worker_config = WorkerConfig {
        concurrency: std::env::var("WORKER_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4),
        poll_interval_ms: std::env::var("WORKER_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1000),
        visibility_timeout_secs: std::env::var("WORKER_VISIBILITY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300),
        base_backoff_secs: std::env::var("WORKER_BASE_BACKOFF_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30),
    };

    let worker = QueueWorker::new(JobQueue::new(pool), registry, worker_config);
    worker.run().await
}
