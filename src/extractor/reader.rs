use readability::extractor;
use scraper::{Html, Selector};
use url::Url;

/// Raw reader-mode output before sanitization.
#[derive(Debug)]
pub struct ReaderOutcome {
    pub title: Option<String>,
    pub content_html: String,
    pub succeeded: bool,
}

/// Run reader-mode extraction, falling back to the whole document body.
///
/// The fallback keeps `succeeded: false` so downstream scoring knows the
/// content is unreduced page markup.
pub fn read_content(html: &str, url: &Url) -> ReaderOutcome {
    if let Ok(article) = extractor::extract(&mut html.as_bytes(), url) {
        let title = non_empty(article.title);
        // Markup without any text is not a readable body, whatever the
        // algorithm thinks of it.
        if !article.text.trim().is_empty() {
            return ReaderOutcome {
                title,
                content_html: article.content,
                succeeded: true,
            };
        }
    }
    fallback(html)
}

fn fallback(html: &str) -> ReaderOutcome {
    let document = Html::parse_document(html);
    ReaderOutcome {
        title: fallback_title(&document),
        content_html: body_html(&document),
        succeeded: false,
    }
}

/// Title from `<title>`, then the first non-empty `<h1>`.
fn fallback_title(document: &Html) -> Option<String> {
    if let Ok(selector) = Selector::parse("title") {
        for element in document.select(&selector) {
            let title = element.text().collect::<String>().trim().to_string();
            if !title.is_empty() {
                return Some(title);
            }
        }
    }

    if let Ok(selector) = Selector::parse("h1") {
        for element in document.select(&selector) {
            let title = element.text().collect::<String>().trim().to_string();
            if !title.is_empty() {
                return Some(title);
            }
        }
    }

    None
}

fn body_html(document: &Html) -> String {
    if let Ok(selector) = Selector::parse("body")
        && let Some(body) = document.select(&selector).next()
    {
        return body.inner_html();
    }
    String::new()
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
