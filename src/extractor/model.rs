use chrono::{DateTime, Utc};

/// Result of one article extraction attempt, ready to build or patch a
/// document. `html_content` has already been through the sanitizer.
///
/// `readability_succeeded` records whether reader mode produced the content
/// or whether we fell back to the raw page body. The scorer treats the
/// fallback case with suspicion since the "content" is then the whole page
/// markup, not the readable article.
#[derive(Debug, Clone)]
pub struct ExtractedArticle {
    pub title: Option<String>,
    pub author: Option<String>,
    pub html_content: String,
    pub markdown_content: String,
    pub plain_text_content: String,
    pub excerpt: Option<String>,
    pub word_count: i32,
    pub reading_time_minutes: i32,
    pub site_name: Option<String>,
    pub lang: Option<String>,
    pub readability_succeeded: bool,
}

/// Metadata scraped from `<meta>`/Open Graph tags. Works on any page,
/// whether or not reader mode succeeds.
#[derive(Debug, Clone, Default)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub site_name: Option<String>,
    pub description: Option<String>,
    pub og_image: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub lang: Option<String>,
}
