//! Feed polling loop.
//!
//! Walks due feeds, ingests new items, and hands follow-up work (enrichment,
//! cover-image caching) to an injected sink so this module never touches the
//! queue directly. Item failures are contained to the item; feed failures are
//! contained to the feed and feed a circuit breaker.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::enrich::EnrichmentSource;
use crate::entities::{AutoTagRule, Document, DocumentSource, Feed, IngestionStatus};
use crate::extractor::{self, ExtractedArticle, PageMetadata};
use crate::feeds::{FeedFetcherTrait, FetchedItem};
use crate::fetch::{FetchError, PageFetcherTrait};
use crate::sanitize;
use crate::scoring::{self, EnrichOptions, ExtractionSignals};
use crate::store::{
    DocumentStoreTrait, IngestionEntry, NewDocument, StoreProviderTrait,
};

/// Consecutive feed-level failures before a feed is switched off.
const FEED_ERROR_THRESHOLD: i32 = 5;

/// Attempts per item page fetch, including the first.
const PAGE_FETCH_ATTEMPTS: u32 = 3;

/// Query parameters that identify a visitor rather than a resource.
const TRACKING_PARAMS: [&str; 7] = [
    "fbclid", "gclid", "dclid", "mc_cid", "mc_eid", "ref_src", "igshid",
];

fn fetch_backoff(attempt: u32) -> Duration {
    Duration::from_millis(u64::from(attempt * attempt) * 100)
}

/// Canonical form of an article URL, used for dedup.
///
/// Lowercases scheme and host, strips the fragment and tracking parameters,
/// and trims the trailing slash on non-root paths. Returns `None` when the
/// input is not an absolute http(s) URL.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    if url.path().len() > 1 && url.path().ends_with('/') {
        let trimmed = url.path().trim_end_matches('/').to_string();
        url.set_path(&trimmed);
    }

    Some(url.to_string())
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Follow-up work produced while ingesting, routed through [`WorkSinkTrait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    Enrich(EnrichmentRequest),
    CacheImage { document_id: Uuid },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentRequest {
    pub document_id: Uuid,
    pub url: String,
    pub score: u8,
    pub source: EnrichmentSource,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait WorkSinkTrait: Send + Sync {
    async fn submit(&self, user_id: Uuid, item: WorkItem) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct PollResult {
    pub feed_id: Uuid,
    pub success: bool,
    pub new_items: usize,
    pub deactivated: bool,
    pub error: Option<String>,
}

impl PollResult {
    fn failed(feed_id: Uuid, error: String) -> Self {
        Self {
            feed_id,
            success: false,
            new_items: 0,
            deactivated: false,
            error: Some(error),
        }
    }
}

pub struct FeedPoller {
    provider: Arc<dyn StoreProviderTrait>,
    feeds: Arc<dyn FeedFetcherTrait>,
    pages: Arc<dyn PageFetcherTrait>,
    sink: Arc<dyn WorkSinkTrait>,
    enrich_threshold: u8,
}

impl FeedPoller {
    pub fn new(
        provider: Arc<dyn StoreProviderTrait>,
        feeds: Arc<dyn FeedFetcherTrait>,
        pages: Arc<dyn PageFetcherTrait>,
        sink: Arc<dyn WorkSinkTrait>,
        enrich_threshold: u8,
    ) -> Self {
        Self {
            provider,
            feeds,
            pages,
            sink,
            enrich_threshold,
        }
    }

    /// Poll every due feed, up to `limit`, one at a time. A failing feed
    /// becomes a failed result and never takes the batch down with it.
    #[instrument(skip(self))]
    pub async fn poll_due(&self, limit: i64) -> anyhow::Result<Vec<PollResult>> {
        let due = self.provider.due_feeds(limit).await?;
        info!(count = due.len(), "polling due feeds");

        let mut results = Vec::with_capacity(due.len());
        for feed in due {
            results.push(self.poll_feed(feed.user_id, feed.id).await);
        }
        Ok(results)
    }

    #[instrument(skip(self), fields(user_id = %user_id, feed_id = %feed_id))]
    pub async fn poll_feed(&self, user_id: Uuid, feed_id: Uuid) -> PollResult {
        let store = self.provider.scoped(user_id);

        // Administrative states are not poll failures, so they bypass the
        // error counter entirely.
        let feed = match store.get_feed(feed_id).await {
            Ok(Some(feed)) if feed.active && feed.deleted_at.is_none() => feed,
            Ok(Some(_)) => {
                debug!("feed is inactive or deleted, skipping");
                return PollResult::failed(feed_id, "feed is inactive".to_string());
            }
            Ok(None) => return PollResult::failed(feed_id, "feed not found".to_string()),
            Err(err) => return PollResult::failed(feed_id, err.to_string()),
        };

        match self.ingest_feed(store.as_ref(), &feed).await {
            Ok(new_items) => {
                info!(new_items, "feed polled");
                PollResult {
                    feed_id,
                    success: true,
                    new_items,
                    deactivated: false,
                    error: None,
                }
            }
            Err(err) => self.record_feed_failure(store.as_ref(), feed_id, err).await,
        }
    }

    async fn ingest_feed(
        &self,
        store: &dyn DocumentStoreTrait,
        feed: &Feed,
    ) -> anyhow::Result<usize> {
        let fetched = self.feeds.fetch_feed(&feed.url).await?;

        let mut new_items = 0usize;
        for item in &fetched.items {
            match self.ingest_item(store, feed, item).await {
                Ok(true) => new_items += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(url = %item.url, error = %err, "feed item failed");
                    let entry = IngestionEntry {
                        feed_id: Some(feed.id),
                        document_id: None,
                        url: Some(item.url.clone()),
                        status: IngestionStatus::Failed,
                        detail: Some(err.to_string()),
                    };
                    if let Err(log_err) = store.log_ingestion(entry).await {
                        warn!(error = %log_err, "failed to record item failure");
                    }
                }
            }
        }

        store.mark_feed_fetched(feed.id).await?;
        Ok(new_items)
    }

    /// Returns `Ok(true)` when a document was created, `Ok(false)` for a
    /// dedup skip.
    async fn ingest_item(
        &self,
        store: &dyn DocumentStoreTrait,
        feed: &Feed,
        item: &FetchedItem,
    ) -> anyhow::Result<bool> {
        let Some(normalized) = normalize_url(&item.url) else {
            anyhow::bail!("item url does not parse: {}", item.url);
        };
        if store.get_document_by_url(&normalized).await?.is_some() {
            debug!(url = %item.url, "already ingested, skipping");
            return Ok(false);
        }

        let (extraction, page_meta) = if feed.fetch_full_content {
            match self.fetch_article(&item.url).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(url = %item.url, error = %err, "full content fetch failed, using embedded content");
                    (embedded_article(item), PageMetadata::default())
                }
            }
        } else {
            (embedded_article(item), PageMetadata::default())
        };

        let excerpt = extraction
            .excerpt
            .clone()
            .filter(|e| !e.trim().is_empty())
            .or_else(|| extractor::excerpt_from_text(&extraction.plain_text_content));

        let document = store
            .create_document(NewDocument {
                feed_id: Some(feed.id),
                url: Some(item.url.clone()),
                normalized_url: Some(normalized),
                title: extraction.title.clone().or_else(|| item.title.clone()),
                author: extraction.author.clone().or_else(|| item.author.clone()),
                site_name: extraction.site_name.clone(),
                excerpt,
                html_content: non_empty(extraction.html_content.clone()),
                markdown_content: non_empty(extraction.markdown_content.clone()),
                plain_text_content: non_empty(extraction.plain_text_content.clone()),
                cover_image_url: item
                    .cover_image_url
                    .clone()
                    .or_else(|| page_meta.og_image.clone()),
                lang: extraction.lang.clone(),
                word_count: Some(extraction.word_count),
                reading_time_minutes: Some(extraction.reading_time_minutes),
                published_at: item.published_at.or(page_meta.published_at),
                source: DocumentSource::Rss,
            })
            .await?;

        let tags = collect_tags(feed, item, &document);
        if !tags.is_empty() {
            store.add_tags(document.id, &tags).await?;
        }

        let success_entry = IngestionEntry {
            feed_id: Some(feed.id),
            document_id: Some(document.id),
            url: Some(item.url.clone()),
            status: IngestionStatus::Success,
            detail: None,
        };
        if let Err(log_err) = store.log_ingestion(success_entry).await {
            warn!(error = %log_err, "failed to record ingestion");
        }

        // Only feeds that ask for full content take part in the enrichment
        // cycle; a failed fetch falls back to embedded content, scores low,
        // and gets picked up here.
        if feed.fetch_full_content {
            let signals = ExtractionSignals {
                readability_succeeded: Some(extraction.readability_succeeded),
                ..ExtractionSignals::from_document(&document)
            };
            let score = scoring::score_extraction(&signals);
            let options = EnrichOptions {
                threshold: self.enrich_threshold,
                has_url: true,
            };
            if scoring::should_enrich(score, &options) {
                debug!(score, document_id = %document.id, "queueing enrichment");
                self.sink
                    .submit(
                        feed.user_id,
                        WorkItem::Enrich(EnrichmentRequest {
                            document_id: document.id,
                            url: item.url.clone(),
                            score,
                            source: EnrichmentSource::RssFullContent,
                        }),
                    )
                    .await?;
            }
        }

        if document.cover_image_url.is_some() {
            self.sink
                .submit(
                    feed.user_id,
                    WorkItem::CacheImage {
                        document_id: document.id,
                    },
                )
                .await?;
        }

        Ok(true)
    }

    /// Fetch an item's page with bounded retries, then extract.
    async fn fetch_article(
        &self,
        url: &str,
    ) -> Result<(ExtractedArticle, PageMetadata), FetchError> {
        let mut attempt = 1u32;
        loop {
            match self.pages.fetch_page(url).await {
                Ok(page) => {
                    let article = extractor::extract_article(&page.body, &page.url_final);
                    let meta = extractor::extract_metadata(&page.body);
                    return Ok((article, meta));
                }
                Err(err) if err.should_retry() && attempt < PAGE_FETCH_ATTEMPTS => {
                    debug!(attempt, url, error = %err, "page fetch failed, retrying");
                    tokio::time::sleep(fetch_backoff(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn record_feed_failure(
        &self,
        store: &dyn DocumentStoreTrait,
        feed_id: Uuid,
        err: anyhow::Error,
    ) -> PollResult {
        warn!(error = %err, "feed poll failed");

        let entry = IngestionEntry {
            feed_id: Some(feed_id),
            document_id: None,
            url: None,
            status: IngestionStatus::Failed,
            detail: Some(err.to_string()),
        };
        if let Err(log_err) = store.log_ingestion(entry).await {
            warn!(error = %log_err, "failed to record feed failure");
        }

        let mut deactivated = false;
        match store.increment_feed_error(feed_id).await {
            Ok(error_count) if error_count >= FEED_ERROR_THRESHOLD => {
                match store.deactivate_feed(feed_id).await {
                    Ok(()) => {
                        warn!(error_count, "feed deactivated after repeated failures");
                        deactivated = true;
                    }
                    Err(deact_err) => warn!(error = %deact_err, "failed to deactivate feed"),
                }
            }
            Ok(_) => {}
            Err(incr_err) => warn!(error = %incr_err, "failed to increment feed error count"),
        }

        PollResult {
            feed_id,
            success: false,
            new_items: 0,
            deactivated,
            error: Some(err.to_string()),
        }
    }
}

/// Build an article from the feed item's own content when the page itself
/// is unavailable or unwanted.
fn embedded_article(item: &FetchedItem) -> ExtractedArticle {
    let raw_html = item
        .content_html
        .clone()
        .or_else(|| item.content_text.as_deref().map(paragraphs_from_text))
        .unwrap_or_default();

    let html = sanitize::sanitize_html(&raw_html);
    let markdown = sanitize::markdown_from_html(&html);
    let plain = sanitize::plain_text_from_html(&html);
    let word_count = extractor::count_words(&plain);
    let lang = extractor::language::detect_language(&plain);

    ExtractedArticle {
        title: item.title.clone(),
        author: item.author.clone(),
        html_content: html,
        markdown_content: markdown,
        plain_text_content: plain,
        excerpt: item.excerpt.clone(),
        word_count,
        reading_time_minutes: extractor::reading_time_minutes(word_count),
        site_name: None,
        lang,
        readability_succeeded: false,
    }
}

fn paragraphs_from_text(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| format!("<p>{}</p>", escape_text(block)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Feed tags plus any auto-tag rule whose pattern appears in the item's
/// title, author, url, or plain text. Case-insensitive, deduplicated.
fn collect_tags(feed: &Feed, item: &FetchedItem, document: &Document) -> Vec<String> {
    let mut tags = feed.tags.clone();

    let rules: &[AutoTagRule] = &feed.auto_tag_rules;
    if !rules.is_empty() {
        let haystacks = [
            document.title.clone().unwrap_or_default().to_lowercase(),
            document.author.clone().unwrap_or_default().to_lowercase(),
            item.url.to_lowercase(),
            document
                .plain_text_content
                .clone()
                .unwrap_or_default()
                .to_lowercase(),
        ];
        for rule in rules {
            let pattern = rule.pattern.trim().to_lowercase();
            if !pattern.is_empty() && haystacks.iter().any(|h| h.contains(&pattern)) {
                tags.push(rule.tag.clone());
            }
        }
    }

    let mut seen = HashSet::new();
    tags.retain(|tag| seen.insert(tag.clone()));
    tags
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
