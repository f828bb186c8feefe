//! HTML sanitization and Markdown normalization.
//!
//! Pure string-to-string transforms with no I/O. Both the feed-polling path
//! and the enrichment path run captured markup through `sanitize_html` before
//! anything is stored, and `markdown_from_html` works on that sanitized
//! output.

mod clean;
mod markdown;

pub use clean::{rewrite_cid_images, sanitize_html};
pub use markdown::markdown_from_html;

use kuchiki::traits::*;

/// Extract readable text from HTML, joining text nodes with single spaces.
pub fn plain_text_from_html(html: &str) -> String {
    let document = kuchiki::parse_html().one(html);
    let mut out = String::new();
    for node in document.descendants() {
        if let Some(text) = node.as_text() {
            let contents = text.borrow();
            let trimmed = contents.trim();
            if !trimmed.is_empty() {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(trimmed);
            }
        }
    }
    normalize_whitespace(&out)
}

pub fn normalize_whitespace(text: &str) -> String {
    let text = text.trim();

    // Replace runs of spaces/tabs with a single space
    let space_regex = regex::Regex::new(r"[ \t]+").unwrap();
    let spaced = space_regex.replace_all(text, " ");

    // Convert multiple consecutive newlines to double newlines
    let newline_regex = regex::Regex::new(r"\n\s*\n+").unwrap();
    newline_regex.replace_all(&spaced, "\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_joins_block_elements() {
        let text = plain_text_from_html("<p>Hello</p><p>world</p>");
        assert_eq!(text, "Hello world");
    }

    #[test]
    fn test_normalize_whitespace() {
        let text = "  Hello    world  \n\n\n  Test  ";
        let normalized = normalize_whitespace(text);
        assert_eq!(normalized, "Hello world \n\n Test");
    }
}
