//! Enrichment job consumer.
//!
//! Takes a low-quality document, re-renders its URL through the browser
//! rendering service, re-extracts, and overwrites stored content only when
//! the new extraction scores a real improvement. Runs under at-least-once
//! delivery: every step before the final patch is read-only, and the patch
//! itself is idempotent, so redelivery of the same job is harmless.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::extractor;
use crate::render::RenderClient;
use crate::scoring::{self, ExtractionSignals};
use crate::store::{DocumentPatch, DocumentStoreTrait};

/// One enrichment attempt, assembled from a queue row by the job handler.
#[derive(Debug, Clone)]
pub struct EnrichmentJob {
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub document_id: Uuid,
    pub url: String,
    pub source: EnrichmentSource,
    pub attempt: i32,
    pub enqueued_at: DateTime<Utc>,
}

/// Which ingestion path decided the document needed enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentSource {
    ManualUrl,
    RssFullContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentStatus {
    Applied,
    NoImprovement,
    RenderFailed,
    DocumentMissing,
    Skipped,
}

/// What one consumer invocation did, for logging and ack decisions. Not
/// persisted anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentOutcome {
    pub status: EnrichmentStatus,
    pub score_before: Option<u8>,
    pub score_after: Option<u8>,
    pub render_latency_ms: Option<u64>,
}

impl EnrichmentOutcome {
    fn terminal(status: EnrichmentStatus) -> Self {
        Self {
            status,
            score_before: None,
            score_after: None,
            render_latency_ms: None,
        }
    }
}

/// Process one enrichment job to a terminal outcome.
///
/// Returns `Err` only for failures the queue should retry (transient render
/// or store errors); every permanent condition maps to an `Ok` outcome so
/// the job gets acknowledged instead of redelivered forever.
#[instrument(skip_all, fields(job_id = %job.job_id, document_id = %job.document_id, attempt = job.attempt))]
pub async fn process_enrichment_job(
    store: &dyn DocumentStoreTrait,
    render: &RenderClient,
    job: &EnrichmentJob,
) -> anyhow::Result<EnrichmentOutcome> {
    let Some(document) = store.get_document(job.document_id).await? else {
        info!("document missing or deleted, nothing to enrich");
        return Ok(EnrichmentOutcome::terminal(EnrichmentStatus::DocumentMissing));
    };

    // A scoped store should make this impossible, but job payloads outlive
    // the state they were created from. Never mutate across owners.
    if document.user_id != job.user_id {
        warn!(owner = %document.user_id, "job user does not own the document, skipping");
        return Ok(EnrichmentOutcome::terminal(EnrichmentStatus::Skipped));
    }

    let score_before = scoring::score_extraction(&ExtractionSignals::from_document(&document));

    let Ok(url) = Url::parse(&job.url) else {
        warn!(url = %job.url, "unrenderable url on enrichment job");
        return Ok(EnrichmentOutcome {
            status: EnrichmentStatus::RenderFailed,
            score_before: Some(score_before),
            score_after: None,
            render_latency_ms: None,
        });
    };

    let started = Instant::now();
    let html = match render.fetch_rendered_html(&job.url).await {
        Ok(html) => html,
        Err(err) if err.should_retry() => {
            // Propagate unchanged so the queue redelivers the whole job.
            return Err(err.into());
        }
        Err(err) => {
            let render_latency_ms = started.elapsed().as_millis() as u64;
            warn!(error = %err, render_latency_ms, "render failed permanently");
            return Ok(EnrichmentOutcome {
                status: EnrichmentStatus::RenderFailed,
                score_before: Some(score_before),
                score_after: None,
                render_latency_ms: Some(render_latency_ms),
            });
        }
    };
    let render_latency_ms = started.elapsed().as_millis() as u64;

    let article = extractor::extract_article(&html, &url);
    let meta = extractor::extract_metadata(&html);

    // Candidate values: article fields first, metadata fields next, stored
    // values last. The patch carries only the new values; the store keeps
    // anything left as None.
    let patch = DocumentPatch {
        title: article.title.clone(),
        author: article.author.clone(),
        site_name: article.site_name.clone(),
        excerpt: article.excerpt.clone(),
        html_content: non_empty(article.html_content.clone()),
        markdown_content: non_empty(article.markdown_content.clone()),
        plain_text_content: non_empty(article.plain_text_content.clone()),
        cover_image_url: meta.og_image.clone(),
        lang: article.lang.clone(),
        word_count: (article.word_count > 0).then_some(article.word_count),
        reading_time_minutes: (article.word_count > 0).then_some(article.reading_time_minutes),
    };

    let signals_after = ExtractionSignals {
        title: patch.title.as_deref().or(document.title.as_deref()),
        url: document.url.as_deref(),
        html_content: patch
            .html_content
            .as_deref()
            .or(document.html_content.as_deref()),
        plain_text_content: patch
            .plain_text_content
            .as_deref()
            .or(document.plain_text_content.as_deref()),
        author: patch.author.as_deref().or(document.author.as_deref()),
        site_name: patch.site_name.as_deref().or(document.site_name.as_deref()),
        published_at: meta.published_at.or(document.published_at),
        cover_image_url: patch
            .cover_image_url
            .as_deref()
            .or(document.cover_image_url.as_deref()),
        excerpt: patch.excerpt.as_deref().or(document.excerpt.as_deref()),
        word_count: patch.word_count.or(document.word_count),
        readability_succeeded: Some(article.readability_succeeded),
    };
    let score_after = scoring::score_extraction(&signals_after);

    let old_content_present = document.has_content();
    let new_content_present = patch.html_content.is_some() || old_content_present;

    if !scoring::is_improvement(
        score_before,
        score_after,
        old_content_present,
        new_content_present,
    ) {
        info!(score_before, score_after, "no improvement, keeping stored content");
        return Ok(EnrichmentOutcome {
            status: EnrichmentStatus::NoImprovement,
            score_before: Some(score_before),
            score_after: Some(score_after),
            render_latency_ms: Some(render_latency_ms),
        });
    }

    store.enrich_document(job.document_id, patch).await?;
    info!(score_before, score_after, render_latency_ms, "enrichment applied");

    Ok(EnrichmentOutcome {
        status: EnrichmentStatus::Applied,
        score_before: Some(score_before),
        score_after: Some(score_after),
        render_latency_ms: Some(render_latency_ms),
    })
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
