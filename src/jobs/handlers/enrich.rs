use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Span, info, instrument};

use crate::enrich::{EnrichmentJob, process_enrichment_job};
use crate::entities::Job;
use crate::jobs::handler::JobHandler;
use crate::jobs::sink::{ENRICH_JOB_KIND, EnrichPayload};
use crate::render::RenderClient;
use crate::store::StoreProviderTrait;

/// Runs the enrichment consumer against queued documents.
#[derive(Clone)]
pub struct EnrichJobHandler {
    provider: Arc<dyn StoreProviderTrait>,
    render: Arc<RenderClient>,
}

impl EnrichJobHandler {
    pub fn new(provider: Arc<dyn StoreProviderTrait>, render: Arc<RenderClient>) -> Self {
        Self { provider, render }
    }
}

#[async_trait]
impl JobHandler for EnrichJobHandler {
    #[instrument(skip(self, job), fields(job_id = %job.id, document_id))]
    async fn run(&self, job: &Job) -> anyhow::Result<()> {
        let payload: EnrichPayload = serde_json::from_value(job.payload.clone())?;
        Span::current().record("document_id", tracing::field::display(payload.document_id));

        let enrichment = EnrichmentJob {
            job_id: job.id,
            user_id: payload.user_id,
            document_id: payload.document_id,
            url: payload.url,
            source: payload.source,
            attempt: job.attempts,
            enqueued_at: job.created_at,
        };

        let store = self.provider.scoped(payload.user_id);
        let outcome = process_enrichment_job(store.as_ref(), &self.render, &enrichment).await?;

        info!(
            status = ?outcome.status,
            score_before = outcome.score_before,
            score_after = outcome.score_after,
            render_latency_ms = outcome.render_latency_ms,
            "enrichment job finished"
        );
        Ok(())
    }

    fn kind(&self) -> &'static str {
        ENRICH_JOB_KIND
    }
}
