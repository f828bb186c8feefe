use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

/// --- PostgreSQL Enums ---

#[derive(sqlx::Type, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "document_source", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DocumentSource {
    #[default]
    ManualUrl,
    Rss,
    Email,
}

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "ingestion_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IngestionStatus {
    Success,
    Failed,
}

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// --- Tables ---

#[derive(Debug, Clone, FromRow)]
pub struct Document {
    pub id: Uuid,
    pub user_id: Uuid,
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
    pub cover_image_key: Option<String>,
    pub lang: Option<String>,
    pub word_count: Option<i32>,
    pub reading_time_minutes: Option<i32>,
    pub published_at: Option<DateTime<Utc>>,
    pub source: DocumentSource,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// A document counts as having content once a non-empty readable body is stored.
    pub fn has_content(&self) -> bool {
        self.html_content
            .as_deref()
            .is_some_and(|h| !h.trim().is_empty())
    }
}

/// A single substring rule evaluated against new feed items; a hit applies `tag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoTagRule {
    pub pattern: String,
    pub tag: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Feed {
    pub id: Uuid,
    pub user_id: Uuid,
    pub url: String,
    pub title: Option<String>,
    pub site_url: Option<String>,
    pub icon_url: Option<String>,
    pub active: bool,
    pub fetch_full_content: bool,
    pub fetch_interval_minutes: i32,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub error_count: i32,
    pub tags: Vec<String>,
    pub auto_tag_rules: Json<Vec<AutoTagRule>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub kind: String,               // logical job name
    pub payload: serde_json::Value, // job data as JSONB
    pub run_at: DateTime<Utc>,      // next time the job is eligible
    pub attempts: i32,              // execution attempts so far
    pub max_attempts: i32,          // maximum attempts before giving up
    pub backoff_seconds: i32,       // populated when job fails
    pub status: JobStatus,
    pub last_error: Option<String>,
    pub visibility_till: Option<DateTime<Utc>>, // set while "running"
    pub reserved_by: Option<Uuid>,              // worker instance id
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
