use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::signal;
use tokio::sync::Semaphore;
use tokio::time::{interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::entities::Job;
use crate::jobs::{JobQueue, JobRegistry, calculate_backoff_delay};

#[derive(Clone)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    pub visibility_timeout_secs: i64,
    pub base_backoff_secs: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval_ms: 1000,
            visibility_timeout_secs: 300, // 5 minutes
            base_backoff_secs: 30,
        }
    }
}

/// Drives the queue: claims batches of due jobs and runs each in its own
/// task under a concurrency limit. Ctrl-C cancels the claim loop and the
/// worker drains whatever is still in flight before returning.
pub struct QueueWorker {
    queue: JobQueue,
    registry: Arc<JobRegistry>,
    config: WorkerConfig,
    worker_id: Uuid,
    shutdown: CancellationToken,
}

impl QueueWorker {
    pub fn new(queue: JobQueue, registry: JobRegistry, config: WorkerConfig) -> Self {
        Self {
            queue,
            registry: Arc::new(registry),
            config,
            worker_id: Uuid::new_v4(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the worker when cancelled. Ctrl-C cancels it too.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn run(self) -> Result<()> {
        info!(
            worker_id = %self.worker_id,
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval_ms,
            visibility_timeout_secs = self.config.visibility_timeout_secs,
            kinds = ?self.registry.registered_kinds(),
            "queue worker starting"
        );

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
                return;
            }
            info!("shutdown signal received");
            shutdown.cancel();
        });

        let slots = Arc::new(Semaphore::new(self.config.concurrency));
        let mut ticker = interval(Duration::from_millis(self.config.poll_interval_ms));

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.claim_and_spawn(&slots).await {
                        error!(error = %e, "claim pass failed");
                        // Do not hammer a database that just refused us.
                        sleep(Duration::from_millis(1000)).await;
                    }
                }
            }
        }

        info!("shutdown initiated, draining in-flight jobs");
        // Every slot back means every spawned job has settled.
        let _all = slots.acquire_many(self.config.concurrency as u32).await?;
        info!("all jobs drained, worker stopped");
        Ok(())
    }

    /// Claim as many due jobs as there are free slots and run each in its
    /// own task. Permits travel with the tasks, so a full worker claims
    /// nothing and leaves due jobs for the next pass (or another worker).
    async fn claim_and_spawn(&self, slots: &Arc<Semaphore>) -> Result<()> {
        let free = slots.available_permits();
        if free == 0 {
            return Ok(());
        }

        let jobs = self
            .queue
            .claim_due(free as i64, self.worker_id, self.config.visibility_timeout_secs)
            .await?;
        if !jobs.is_empty() {
            debug!(count = jobs.len(), "claimed jobs");
        }

        for job in jobs {
            let permit = slots.clone().acquire_owned().await?;
            let queue = self.queue.clone();
            let registry = self.registry.clone();
            let base_backoff_secs = self.config.base_backoff_secs;

            let span = info_span!("job", id = %job.id, kind = %job.kind, attempt = job.attempts);
            tokio::spawn(
                async move {
                    let _permit = permit; // held until the job settles
                    run_job(&queue, registry.as_ref(), job, base_backoff_secs).await;
                }
                .instrument(span),
            );
        }
        Ok(())
    }
}

/// Run one claimed job and settle its row: completed on success, requeued
/// with backoff while attempts remain, failed for good otherwise.
async fn run_job(queue: &JobQueue, registry: &JobRegistry, job: Job, base_backoff_secs: u32) {
    info!(attempt = job.attempts + 1, "processing job");

    let Some(handler) = registry.handler_for(&job.kind) else {
        // No retry will make a handler appear.
        error!(kind = %job.kind, "no handler registered for job kind");
        let _ = queue
            .fail(
                job.id,
                &format!("no handler registered for kind {:?}", job.kind),
                None,
                0,
            )
            .await;
        return;
    };

    match handler.run(&job).await {
        Ok(()) => {
            info!("job completed");
            if let Err(e) = queue.complete(job.id).await {
                error!(error = %e, "failed to mark job as succeeded");
            }
        }
        Err(e) => {
            let attempt = job.attempts + 1;
            error!(error = %e, attempt, "job failed");

            let settled = if attempt < job.max_attempts {
                let delay = calculate_backoff_delay(attempt, base_backoff_secs);
                let next_run_at = Utc::now()
                    + chrono::Duration::from_std(delay)
                        .unwrap_or_else(|_| chrono::Duration::seconds(base_backoff_secs as i64));
                info!(
                    delay_secs = delay.as_secs(),
                    attempt,
                    max_attempts = job.max_attempts,
                    "scheduling retry"
                );
                queue
                    .fail(job.id, &e.to_string(), Some(next_run_at), delay.as_secs() as i32)
                    .await
            } else {
                warn!(attempt, "job permanently failed");
                queue.fail(job.id, &e.to_string(), None, 0).await
            };

            if let Err(settle_err) = settled {
                error!(error = %settle_err, "failed to settle failed job");
            }
        }
    }
}
