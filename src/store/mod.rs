//! Persistence seams for documents, feeds, tags, and the ingestion log.
//!
//! `DocumentStoreTrait` is scoped to one owning user at construction; every
//! query it runs is filtered by that user id, so callers cannot reach
//! another user's rows by mistake. `StoreProviderTrait` hands out scoped
//! stores and the few cross-user queries the scheduler needs.

mod postgres;

pub use postgres::{PgStore, PgStoreProvider};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entities::{Document, DocumentSource, Feed, IngestionStatus};

/// Fields for creating a document from an ingestion path.
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub feed_id: Option<Uuid>,
    pub url: Option<String>,
    pub normalized_url: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub site_name: Option<String>,
    pub excerpt: Option<String>,
    pub html_content: Option<String>,
    pub markdown_content: Option<String>,
    pub plain_text_content: Option<String>,
    pub cover_image_url: Option<String>,
    pub lang: Option<String>,
    pub word_count: Option<i32>,
    pub reading_time_minutes: Option<i32>,
    pub published_at: Option<DateTime<Utc>>,
    pub source: DocumentSource,
}

/// Partial update applied by the enrichment path.
///
/// `None` means "leave the stored value alone". The field set is bounded on
/// purpose: enrichment may improve content and metadata but never touches
/// ownership, location, or tag fields.
#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub site_name: Option<String>,
    pub excerpt: Option<String>,
    pub html_content: Option<String>,
    pub markdown_content: Option<String>,
    pub plain_text_content: Option<String>,
    pub cover_image_url: Option<String>,
    pub lang: Option<String>,
    pub word_count: Option<i32>,
    pub reading_time_minutes: Option<i32>,
}

/// One row in the ingestion log.
#[derive(Debug, Clone)]
pub struct IngestionEntry {
    pub feed_id: Option<Uuid>,
    pub document_id: Option<Uuid>,
    pub url: Option<String>,
    pub status: IngestionStatus,
    pub detail: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStoreTrait: Send + Sync {
    async fn get_document(&self, id: Uuid) -> anyhow::Result<Option<Document>>;

    async fn get_document_by_url(&self, normalized_url: &str)
    -> anyhow::Result<Option<Document>>;

    async fn create_document(&self, new: NewDocument) -> anyhow::Result<Document>;

    /// Apply a partial update to a document's content fields.
    async fn enrich_document(&self, id: Uuid, patch: DocumentPatch) -> anyhow::Result<()>;

    async fn set_cover_image_key(&self, id: Uuid, key: &str) -> anyhow::Result<()>;

    async fn get_feed(&self, id: Uuid) -> anyhow::Result<Option<Feed>>;

    /// Record a successful poll and reset the consecutive-error counter.
    async fn mark_feed_fetched(&self, id: Uuid) -> anyhow::Result<()>;

    /// Bump the consecutive-error counter, returning the new value.
    async fn increment_feed_error(&self, id: Uuid) -> anyhow::Result<i32>;

    async fn deactivate_feed(&self, id: Uuid) -> anyhow::Result<()>;

    async fn add_tags(&self, document_id: Uuid, tags: &[String]) -> anyhow::Result<()>;

    async fn log_ingestion(&self, entry: IngestionEntry) -> anyhow::Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoreProviderTrait: Send + Sync {
    /// A store bound to one owning user.
    fn scoped(&self, user_id: Uuid) -> Arc<dyn DocumentStoreTrait>;

    /// Active feeds across all users whose fetch interval has elapsed.
    async fn due_feeds(&self, limit: i64) -> anyhow::Result<Vec<Feed>>;
}
