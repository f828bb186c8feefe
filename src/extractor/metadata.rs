use chrono::{DateTime, NaiveDate, Utc};
use scraper::{Html, Selector};

use crate::extractor::model::PageMetadata;

/// Scrape `<meta>`/Open Graph metadata from a page.
///
/// Used as the primary path for bookmark-only saves and as a supplement to
/// full article extraction. Never fails; fields missing from the page are
/// simply `None`.
pub fn extract_metadata(html: &str) -> PageMetadata {
    let document = Html::parse_document(html);

    let title = meta_content(&document, "meta[property='og:title']")
        .or_else(|| meta_content(&document, "meta[name='twitter:title']"))
        .or_else(|| element_text(&document, "title"));
    let author = meta_content(&document, "meta[name='author']")
        .or_else(|| meta_content(&document, "meta[property='article:author']"));
    let site_name = meta_content(&document, "meta[property='og:site_name']")
        .or_else(|| site_from_title(&document));
    let description = meta_content(&document, "meta[name='description']")
        .or_else(|| meta_content(&document, "meta[property='og:description']"));
    let og_image = meta_content(&document, "meta[property='og:image']")
        .or_else(|| meta_content(&document, "meta[name='twitter:image']"));
    let published_at = meta_content(&document, "meta[property='article:published_time']")
        .or_else(|| attr_value(&document, "time[datetime]", "datetime"))
        .and_then(|raw| parse_published(&raw));
    let lang = attr_value(&document, "html", "lang")
        .or_else(|| meta_content(&document, "meta[property='og:locale']"))
        .and_then(|raw| primary_lang(&raw));

    PageMetadata {
        title,
        author,
        site_name,
        description,
        og_image,
        published_at,
        lang,
    }
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    attr_value(document, selector, "content")
}

fn attr_value(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    for element in document.select(&selector) {
        if let Some(value) = element.value().attr(attr) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn element_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    for element in document.select(&selector) {
        let text = element.text().collect::<String>().trim().to_string();
        if !text.is_empty() {
            return Some(text);
        }
    }
    None
}

/// Site name from patterns like "Article Title - Site Name" or
/// "Article Title | Site Name" in the document title.
fn site_from_title(document: &Html) -> Option<String> {
    let title = element_text(document, "title")?;
    if let Some(pos) = title.rfind(" - ") {
        return Some(title[pos + 3..].to_string());
    }
    if let Some(pos) = title.rfind(" | ") {
        return Some(title[pos + 3..].to_string());
    }
    None
}

/// Accepts RFC 3339, RFC 2822, and bare `YYYY-MM-DD` dates.
fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    None
}

/// "en-US" -> "en"; rejects values that are not letters.
fn primary_lang(raw: &str) -> Option<String> {
    let primary: String = raw
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .flat_map(|c| c.to_lowercase())
        .collect();
    if primary.len() < 2 {
        None
    } else {
        Some(primary)
    }
}
