pub mod language;
pub mod metadata;
pub mod model;
pub mod reader;

pub use metadata::extract_metadata;
pub use model::{ExtractedArticle, PageMetadata};

use url::Url;

use crate::sanitize;

const WORDS_PER_MINUTE: i32 = 200;
const EXCERPT_MAX_CHARS: usize = 200;

/// Extract a readable article from raw page HTML.
///
/// Reader-mode output (or the fallback body) is always sanitized before
/// word count and reading time are computed, so stored content never
/// reflects markup the sanitizer would have dropped. Metadata fills gaps
/// the reader leaves: title, author, site name, excerpt, language.
pub fn extract_article(html: &str, url: &Url) -> ExtractedArticle {
    let outcome = reader::read_content(html, url);
    let meta = metadata::extract_metadata(html);

    let html_content = sanitize::sanitize_html(&outcome.content_html);
    let markdown_content = sanitize::markdown_from_html(&html_content);
    let plain_text_content = sanitize::plain_text_from_html(&html_content);

    let word_count = count_words(&plain_text_content);
    let title = outcome.title.or_else(|| meta.title.clone());
    let excerpt = meta
        .description
        .clone()
        .or_else(|| excerpt_from_text(&plain_text_content));
    let lang = language::detect_language(&plain_text_content).or(meta.lang);

    ExtractedArticle {
        title,
        author: meta.author,
        html_content,
        markdown_content,
        plain_text_content,
        excerpt,
        word_count,
        reading_time_minutes: reading_time_minutes(word_count),
        site_name: meta.site_name,
        lang,
        readability_succeeded: outcome.succeeded,
    }
}

pub fn count_words(text: &str) -> i32 {
    text.split_whitespace().count() as i32
}

/// Roughly 200 words per minute, never less than one minute.
pub fn reading_time_minutes(word_count: i32) -> i32 {
    ((word_count + WORDS_PER_MINUTE - 1) / WORDS_PER_MINUTE).max(1)
}

/// First ~200 characters of text, cut on a word boundary.
pub fn excerpt_from_text(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.chars().count() <= EXCERPT_MAX_CHARS {
        return Some(text.to_string());
    }

    let mut cut = String::new();
    for word in text.split_whitespace() {
        if cut.chars().count() + word.chars().count() + 1 > EXCERPT_MAX_CHARS {
            break;
        }
        if !cut.is_empty() {
            cut.push(' ');
        }
        cut.push_str(word);
    }
    if cut.is_empty() {
        cut = text.chars().take(EXCERPT_MAX_CHARS).collect();
    }
    cut.push('…');
    Some(cut)
}
