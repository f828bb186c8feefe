use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::enrich::EnrichmentSource;
use crate::jobs::JobQueue;
use crate::poller::{WorkItem, WorkSinkTrait};

pub const ENRICH_JOB_KIND: &str = "enrich";
pub const CACHE_IMAGE_JOB_KIND: &str = "cache_image";

/// Render outages resolve on their own; stop re-rendering a page long
/// before the queue-wide default would.
const ENRICH_MAX_ATTEMPTS: i32 = 8;
const CACHE_IMAGE_MAX_ATTEMPTS: i32 = 5;

/// Queue payload for [`ENRICH_JOB_KIND`] jobs.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnrichPayload {
    pub user_id: Uuid,
    pub document_id: Uuid,
    pub url: String,
    pub score: u8,
    pub source: EnrichmentSource,
}

/// Queue payload for [`CACHE_IMAGE_JOB_KIND`] jobs.
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheImagePayload {
    pub user_id: Uuid,
    pub document_id: Uuid,
}

/// The poller's work sink, backed by the jobs table.
pub struct PgWorkSink {
    queue: JobQueue,
}

impl PgWorkSink {
    pub fn new(pool: PgPool) -> Self {
        Self {
            queue: JobQueue::new(pool),
        }
    }
}

#[async_trait]
impl WorkSinkTrait for PgWorkSink {
    async fn submit(&self, user_id: Uuid, item: WorkItem) -> anyhow::Result<()> {
        let (kind, payload, max_attempts) = match item {
            WorkItem::Enrich(request) => (
                ENRICH_JOB_KIND,
                serde_json::to_value(EnrichPayload {
                    user_id,
                    document_id: request.document_id,
                    url: request.url,
                    score: request.score,
                    source: request.source,
                })?,
                ENRICH_MAX_ATTEMPTS,
            ),
            WorkItem::CacheImage { document_id } => (
                CACHE_IMAGE_JOB_KIND,
                serde_json::to_value(CacheImagePayload {
                    user_id,
                    document_id,
                })?,
                CACHE_IMAGE_MAX_ATTEMPTS,
            ),
        };

        let job_id = self
            .queue
            .enqueue(kind, payload, None, Some(max_attempts))
            .await?;
        debug!(kind, %job_id, "work item enqueued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrich_payload_round_trips() {
        let payload = EnrichPayload {
            user_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            url: "https://example.com/a".to_string(),
            score: 40,
            source: EnrichmentSource::RssFullContent,
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["source"], "rss_full_content");
        let back: EnrichPayload = serde_json::from_value(value).unwrap();
        assert_eq!(back.document_id, payload.document_id);
        assert_eq!(back.score, 40);
    }
}
