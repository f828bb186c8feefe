use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::{Document, Feed};
use crate::store::{
    DocumentPatch, DocumentStoreTrait, IngestionEntry, NewDocument, StoreProviderTrait,
};

const DOCUMENT_COLUMNS: &str = "id, user_id, feed_id, url, normalized_url, title, author, \
     site_name, excerpt, html_content, markdown_content, plain_text_content, cover_image_url, \
     cover_image_key, lang, word_count, reading_time_minutes, published_at, source, deleted_at, \
     created_at, updated_at";

const FEED_COLUMNS: &str = "id, user_id, url, title, site_url, icon_url, active, \
     fetch_full_content, fetch_interval_minutes, last_fetched_at, error_count, tags, \
     auto_tag_rules, deleted_at, created_at, updated_at";

/// Store scoped to a single owning user.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    user_id: Uuid,
}

impl PgStore {
    pub fn new(pool: PgPool, user_id: Uuid) -> Self {
        Self { pool, user_id }
    }
}

#[async_trait]
impl DocumentStoreTrait for PgStore {
    async fn get_document(&self, id: Uuid) -> anyhow::Result<Option<Document>> {
        let query = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents \
             WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL"
        );
        let document = sqlx::query_as::<_, Document>(&query)
            .bind(id)
            .bind(self.user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(document)
    }

    async fn get_document_by_url(
        &self,
        normalized_url: &str,
    ) -> anyhow::Result<Option<Document>> {
        // Deliberately includes soft-deleted rows: a deleted article must not
        // resurrect on the next poll of the same feed.
        let query = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents \
             WHERE normalized_url = $1 AND user_id = $2"
        );
        let document = sqlx::query_as::<_, Document>(&query)
            .bind(normalized_url)
            .bind(self.user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(document)
    }

    async fn create_document(&self, new: NewDocument) -> anyhow::Result<Document> {
        let query = format!(
            "INSERT INTO documents (user_id, feed_id, url, normalized_url, title, author, \
             site_name, excerpt, html_content, markdown_content, plain_text_content, \
             cover_image_url, lang, word_count, reading_time_minutes, published_at, source) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
             RETURNING {DOCUMENT_COLUMNS}"
        );
        let document = sqlx::query_as::<_, Document>(&query)
            .bind(self.user_id)
            .bind(new.feed_id)
            .bind(new.url)
            .bind(new.normalized_url)
            .bind(new.title)
            .bind(new.author)
            .bind(new.site_name)
            .bind(new.excerpt)
            .bind(new.html_content)
            .bind(new.markdown_content)
            .bind(new.plain_text_content)
            .bind(new.cover_image_url)
            .bind(new.lang)
            .bind(new.word_count)
            .bind(new.reading_time_minutes)
            .bind(new.published_at)
            .bind(new.source)
            .fetch_one(&self.pool)
            .await?;
        Ok(document)
    }

    async fn enrich_document(&self, id: Uuid, patch: DocumentPatch) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE documents SET \
                title = COALESCE($3, title), \
                author = COALESCE($4, author), \
                site_name = COALESCE($5, site_name), \
                excerpt = COALESCE($6, excerpt), \
                html_content = COALESCE($7, html_content), \
                markdown_content = COALESCE($8, markdown_content), \
                plain_text_content = COALESCE($9, plain_text_content), \
                cover_image_url = COALESCE($10, cover_image_url), \
                lang = COALESCE($11, lang), \
                word_count = COALESCE($12, word_count), \
                reading_time_minutes = COALESCE($13, reading_time_minutes), \
                updated_at = now() \
             WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(self.user_id)
        .bind(patch.title)
        .bind(patch.author)
        .bind(patch.site_name)
        .bind(patch.excerpt)
        .bind(patch.html_content)
        .bind(patch.markdown_content)
        .bind(patch.plain_text_content)
        .bind(patch.cover_image_url)
        .bind(patch.lang)
        .bind(patch.word_count)
        .bind(patch.reading_time_minutes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_cover_image_key(&self, id: Uuid, key: &str) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE documents SET cover_image_key = $3, updated_at = now() \
             WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(self.user_id)
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_feed(&self, id: Uuid) -> anyhow::Result<Option<Feed>> {
        let query = format!(
            "SELECT {FEED_COLUMNS} FROM feeds \
             WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL"
        );
        let feed = sqlx::query_as::<_, Feed>(&query)
            .bind(id)
            .bind(self.user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(feed)
    }

    async fn mark_feed_fetched(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE feeds SET last_fetched_at = now(), error_count = 0, updated_at = now() \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(self.user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_feed_error(&self, id: Uuid) -> anyhow::Result<i32> {
        let error_count = sqlx::query_scalar::<_, i32>(
            "UPDATE feeds SET error_count = error_count + 1, updated_at = now() \
             WHERE id = $1 AND user_id = $2 \
             RETURNING error_count",
        )
        .bind(id)
        .bind(self.user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(error_count)
    }

    async fn deactivate_feed(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE feeds SET active = false, updated_at = now() \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(self.user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_tags(&self, document_id: Uuid, tags: &[String]) -> anyhow::Result<()> {
        if tags.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "INSERT INTO document_tags (document_id, user_id, tag) \
             SELECT $1, $2, unnest($3::text[]) \
             ON CONFLICT DO NOTHING",
        )
        .bind(document_id)
        .bind(self.user_id)
        .bind(tags)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn log_ingestion(&self, entry: IngestionEntry) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO ingestion_log (user_id, feed_id, document_id, url, status, detail) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(self.user_id)
        .bind(entry.feed_id)
        .bind(entry.document_id)
        .bind(entry.url)
        .bind(entry.status)
        .bind(entry.detail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgStoreProvider {
    pool: PgPool,
}

impl PgStoreProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreProviderTrait for PgStoreProvider {
    fn scoped(&self, user_id: Uuid) -> Arc<dyn DocumentStoreTrait> {
        Arc::new(PgStore::new(self.pool.clone(), user_id))
    }

    async fn due_feeds(&self, limit: i64) -> anyhow::Result<Vec<Feed>> {
        let query = format!(
            "SELECT {FEED_COLUMNS} FROM feeds \
             WHERE active \
               AND deleted_at IS NULL \
               AND (last_fetched_at IS NULL \
                    OR last_fetched_at + make_interval(mins => fetch_interval_minutes) <= now()) \
             ORDER BY last_fetched_at ASC NULLS FIRST \
             LIMIT $1"
        );
        let feeds = sqlx::query_as::<_, Feed>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(feeds)
    }
}
