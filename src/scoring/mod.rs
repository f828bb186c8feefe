//! Extraction quality scoring.
//!
//! `score_extraction` is a pure additive heuristic over a document's
//! signals. The same inputs always produce the same score; the enrichment
//! pipeline relies on that to keep its applied/no-improvement decisions
//! stable across job retries.

pub mod policy;

pub use policy::{DEFAULT_ENRICH_THRESHOLD, EnrichOptions, is_improvement, should_enrich};

use chrono::{DateTime, Utc};

use crate::entities::Document;

/// Signals feeding one scoring call. Ephemeral, borrowed from either a
/// stored document or a fresh extraction.
///
/// `readability_succeeded` is tri-state: `None` means the flag was never
/// recorded and is treated like success. Only an explicit `Some(false)`
/// triggers the raw-markup bias guard.
#[derive(Debug, Clone, Default)]
pub struct ExtractionSignals<'a> {
    pub title: Option<&'a str>,
    pub url: Option<&'a str>,
    pub html_content: Option<&'a str>,
    pub plain_text_content: Option<&'a str>,
    pub author: Option<&'a str>,
    pub site_name: Option<&'a str>,
    pub published_at: Option<DateTime<Utc>>,
    pub cover_image_url: Option<&'a str>,
    pub excerpt: Option<&'a str>,
    pub word_count: Option<i32>,
    pub readability_succeeded: Option<bool>,
}

impl<'a> ExtractionSignals<'a> {
    /// Signals for a document as currently stored.
    pub fn from_document(document: &'a Document) -> Self {
        Self {
            title: document.title.as_deref(),
            url: document.url.as_deref(),
            html_content: document.html_content.as_deref(),
            plain_text_content: document.plain_text_content.as_deref(),
            author: document.author.as_deref(),
            site_name: document.site_name.as_deref(),
            published_at: document.published_at,
            cover_image_url: document.cover_image_url.as_deref(),
            excerpt: document.excerpt.as_deref(),
            word_count: document.word_count,
            readability_succeeded: None,
        }
    }
}

/// Rate extraction quality on a 0-100 scale.
///
/// Additive: title quality (0-15), content size (0-35), metadata
/// completeness (0-30), readability signals (0-20).
pub fn score_extraction(signals: &ExtractionSignals) -> u8 {
    let score = title_points(signals)
        + content_points(signals)
        + metadata_points(signals)
        + signal_points(signals);
    score.min(100)
}

fn title_points(signals: &ExtractionSignals) -> u8 {
    let Some(title) = non_empty(signals.title) else {
        return 0;
    };
    // A title equal to the URL means extraction found nothing better.
    if signals.url.is_some_and(|url| url == title) {
        return 0;
    }
    let len = title.chars().count();
    if len > 10 {
        15
    } else if len > 3 {
        10
    } else {
        5
    }
}

fn content_points(signals: &ExtractionSignals) -> u8 {
    let Some(html) = non_empty(signals.html_content) else {
        return 0;
    };
    if signals.readability_succeeded == Some(false) {
        // Reader mode failed, so html_content is the raw page markup. A big
        // length then means a big JS shell, not rich content: flat 5.
        return 5;
    }
    match html.len() {
        len if len > 2000 => 35,
        len if len > 500 => 25,
        len if len > 100 => 15,
        _ => 5,
    }
}

fn metadata_points(signals: &ExtractionSignals) -> u8 {
    let mut points = 0;
    if non_empty(signals.author).is_some() {
        points += 6;
    }
    if non_empty(signals.site_name).is_some() {
        points += 6;
    }
    if signals.published_at.is_some() {
        points += 6;
    }
    if non_empty(signals.cover_image_url).is_some() {
        points += 6;
    }
    if non_empty(signals.excerpt).is_some_and(|excerpt| excerpt.chars().count() > 20) {
        points += 6;
    }
    points
}

fn signal_points(signals: &ExtractionSignals) -> u8 {
    let mut points = 0;
    match signals.word_count {
        Some(count) if count > 200 => points += 10,
        Some(count) if count > 50 => points += 5,
        _ => {}
    }
    if non_empty(signals.excerpt).is_some_and(|excerpt| excerpt.chars().count() > 50) {
        points += 5;
    }
    if non_empty(signals.plain_text_content).is_some_and(|text| text.len() > 500) {
        points += 5;
    }
    points
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
