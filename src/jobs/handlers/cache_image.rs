use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Span, info, instrument};

use crate::blobs::BlobStoreTrait;
use crate::entities::Job;
use crate::images::cache_cover_image;
use crate::jobs::handler::JobHandler;
use crate::jobs::sink::{CACHE_IMAGE_JOB_KIND, CacheImagePayload};
use crate::store::StoreProviderTrait;

/// Downloads cover images into blob storage.
#[derive(Clone)]
pub struct CacheImageJobHandler {
    provider: Arc<dyn StoreProviderTrait>,
    blobs: Arc<dyn BlobStoreTrait>,
    http: reqwest::Client,
}

impl CacheImageJobHandler {
    pub fn new(
        provider: Arc<dyn StoreProviderTrait>,
        blobs: Arc<dyn BlobStoreTrait>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            provider,
            blobs,
            http,
        }
    }
}

#[async_trait]
impl JobHandler for CacheImageJobHandler {
    #[instrument(skip(self, job), fields(job_id = %job.id, document_id))]
    async fn run(&self, job: &Job) -> anyhow::Result<()> {
        let payload: CacheImagePayload = serde_json::from_value(job.payload.clone())?;
        Span::current().record("document_id", tracing::field::display(payload.document_id));

        let store = self.provider.scoped(payload.user_id);
        let outcome = cache_cover_image(
            store.as_ref(),
            self.blobs.as_ref(),
            &self.http,
            payload.document_id,
        )
        .await?;

        info!(outcome = ?outcome, "image cache job finished");
        Ok(())
    }

    fn kind(&self) -> &'static str {
        CACHE_IMAGE_JOB_KIND
    }
}
