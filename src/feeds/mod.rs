//! Feed fetching and parsing.
//!
//! Wraps feed-rs behind a narrow trait so the poller can be tested without
//! network access. Handles both RSS and Atom; the mapped shape carries only
//! the fields the ingestion path consumes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Feed as ParsedFeed, Link, Text};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use crate::sanitize::{normalize_whitespace, plain_text_from_html};

const MAX_FEED_SIZE: u64 = 5 * 1024 * 1024; // 5MB
const USER_AGENT: &str = "SatchelBot/0.1 (+https://satchel.example.com)";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request failed with status {status}")]
    Http { status: StatusCode, retryable: bool },

    #[error("feed body exceeds {0} bytes")]
    BodyTooLarge(u64),

    #[error("feed did not parse: {0}")]
    Parse(String),

    #[error("feed request timed out")]
    Timeout,

    #[error("feed transport error: {0}")]
    Transport(String),
}

impl FeedError {
    pub fn should_retry(&self) -> bool {
        match self {
            FeedError::Http { retryable, .. } => *retryable,
            FeedError::Timeout | FeedError::Transport(_) => true,
            FeedError::BodyTooLarge(_) | FeedError::Parse(_) => false,
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout
        } else if let Some(status) = err.status() {
            FeedError::Http {
                status,
                retryable: status.is_server_error(),
            }
        } else {
            FeedError::Transport(err.to_string())
        }
    }
}

/// One feed document, parsed and reduced to what ingestion needs.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedFeed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_url: Option<String>,
    pub icon_url: Option<String>,
    pub items: Vec<FetchedItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedItem {
    pub url: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub excerpt: Option<String>,
    pub content_html: Option<String>,
    pub content_text: Option<String>,
    pub cover_image_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedFetcherTrait: Send + Sync {
    async fn fetch_feed(&self, url: &str) -> Result<FetchedFeed, FeedError>;
}

pub struct HttpFeedFetcher {
    http: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { http })
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl FeedFetcherTrait for HttpFeedFetcher {
    async fn fetch_feed(&self, url: &str) -> Result<FetchedFeed, FeedError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(FeedError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Http {
                status,
                retryable: status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
            });
        }

        if let Some(length) = response.content_length()
            && length > MAX_FEED_SIZE
        {
            return Err(FeedError::BodyTooLarge(length));
        }

        let bytes = response.bytes().await.map_err(FeedError::from_reqwest)?;
        if bytes.len() as u64 > MAX_FEED_SIZE {
            return Err(FeedError::BodyTooLarge(bytes.len() as u64));
        }

        // feed-rs resolves the XML encoding declaration itself, so it gets
        // raw bytes rather than a decoded string.
        let parsed =
            feed_rs::parser::parse(bytes.as_ref()).map_err(|e| FeedError::Parse(e.to_string()))?;
        Ok(map_feed(parsed))
    }
}

fn map_feed(feed: ParsedFeed) -> FetchedFeed {
    let items = feed.entries.iter().filter_map(map_entry).collect();
    FetchedFeed {
        title: feed.title.map(|t| t.content),
        description: feed.description.map(|t| t.content),
        site_url: best_link(&feed.links),
        icon_url: feed
            .icon
            .map(|i| i.uri)
            .or_else(|| feed.logo.map(|l| l.uri)),
        items,
    }
}

fn map_entry(entry: &Entry) -> Option<FetchedItem> {
    let Some(url) = best_link(&entry.links) else {
        // Nothing to store or dedup against without a target URL.
        debug!(entry_id = %entry.id, "feed entry has no link, skipping");
        return None;
    };

    let content_body = entry.content.as_ref().and_then(|c| {
        c.body
            .as_deref()
            .map(|body| (body, c.content_type.essence().to_string()))
    });
    let summary_body = entry
        .summary
        .as_ref()
        .map(|t| (t.content.as_str(), t.content_type.essence().to_string()));

    let content_html = pick_body(content_body.clone(), summary_body.clone(), is_html_type);
    let content_text = pick_body(content_body, summary_body, |essence| {
        essence == "text/plain"
    });

    Some(FetchedItem {
        url,
        title: entry.title.as_ref().map(text_content).filter(|t| !t.is_empty()),
        author: entry
            .authors
            .first()
            .map(|p| p.name.trim().to_string())
            .filter(|n| !n.is_empty()),
        excerpt: entry.summary.as_ref().map(summary_text).filter(|s| !s.is_empty()),
        content_html,
        content_text,
        cover_image_url: media_cover(entry),
        published_at: entry.published.or(entry.updated),
    })
}

/// Prefer the entry's content element, fall back to its summary, keeping
/// only bodies whose declared type matches.
fn pick_body(
    content: Option<(&str, String)>,
    summary: Option<(&str, String)>,
    matches: impl Fn(&str) -> bool,
) -> Option<String> {
    content
        .into_iter()
        .chain(summary)
        .find(|(body, essence)| matches(essence) && !body.trim().is_empty())
        .map(|(body, _)| body.to_string())
}

fn is_html_type(essence: &str) -> bool {
    matches!(essence, "text/html" | "application/xhtml+xml")
}

fn text_content(text: &Text) -> String {
    text.content.trim().to_string()
}

/// Summaries serve as excerpts, so markup is stripped no matter how the
/// feed declared the type.
fn summary_text(text: &Text) -> String {
    if is_html_type(&text.content_type.essence().to_string()) {
        plain_text_from_html(&text.content)
    } else {
        normalize_whitespace(&text.content)
    }
}

fn best_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .map(|l| l.href.clone())
}

fn media_cover(entry: &Entry) -> Option<String> {
    for object in &entry.media {
        if let Some(thumbnail) = object.thumbnails.first() {
            return Some(thumbnail.image.uri.clone());
        }
        let image = object.content.iter().find(|c| {
            c.url.is_some()
                && c.content_type
                    .as_ref()
                    .is_some_and(|m| m.essence().to_string().starts_with("image/"))
        });
        if let Some(content) = image {
            return content.url.as_ref().map(|u| u.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> FetchedFeed {
        map_feed(feed_rs::parser::parse(xml.as_bytes()).unwrap())
    }

    #[test]
    fn test_maps_rss_channel_and_items() {
        let feed = parse(
            r#"<?xml version="1.0"?>
            <rss version="2.0">
              <channel>
                <title>Example Blog</title>
                <link>https://example.com</link>
                <description>Posts about examples</description>
                <item>
                  <title>First Post</title>
                  <link>https://example.com/posts/first</link>
                  <description>&lt;p&gt;A short summary of the first post&lt;/p&gt;</description>
                  <pubDate>Tue, 05 Mar 2024 12:30:00 GMT</pubDate>
                </item>
              </channel>
            </rss>"#,
        );

        assert_eq!(feed.title.as_deref(), Some("Example Blog"));
        assert_eq!(feed.description.as_deref(), Some("Posts about examples"));
        assert_eq!(feed.site_url.as_deref(), Some("https://example.com"));
        assert_eq!(feed.items.len(), 1);

        let item = &feed.items[0];
        assert_eq!(item.url, "https://example.com/posts/first");
        assert_eq!(item.title.as_deref(), Some("First Post"));
        let excerpt = item.excerpt.as_deref().unwrap();
        assert!(excerpt.contains("short summary"));
        assert!(!excerpt.contains("<p>"), "excerpt keeps text only: {excerpt}");
        assert!(item.published_at.is_some());
    }

    #[test]
    fn test_maps_atom_content_and_author() {
        let feed = parse(
            r#"<?xml version="1.0"?>
            <feed xmlns="http://www.w3.org/2005/Atom">
              <title>Atom Example</title>
              <link rel="alternate" href="https://example.org"/>
              <updated>2024-03-05T12:30:00Z</updated>
              <id>urn:uuid:feed</id>
              <entry>
                <title>An Entry</title>
                <id>urn:uuid:entry-1</id>
                <link rel="alternate" href="https://example.org/entry-1"/>
                <updated>2024-03-05T12:30:00Z</updated>
                <author><name>Jane Doe</name></author>
                <summary type="text">Plain summary text</summary>
                <content type="html">&lt;p&gt;Full body of the entry&lt;/p&gt;</content>
              </entry>
            </feed>"#,
        );

        let item = &feed.items[0];
        assert_eq!(item.url, "https://example.org/entry-1");
        assert_eq!(item.author.as_deref(), Some("Jane Doe"));
        assert_eq!(item.excerpt.as_deref(), Some("Plain summary text"));
        let html = item.content_html.as_deref().unwrap();
        assert!(html.contains("Full body of the entry"));
        assert!(item.published_at.is_some(), "updated fills in for published");
    }

    #[test]
    fn test_entry_without_link_is_skipped() {
        let feed = parse(
            r#"<?xml version="1.0"?>
            <rss version="2.0">
              <channel>
                <title>Example</title>
                <item><title>Linkless</title><description>no link</description></item>
                <item><title>Linked</title><link>https://example.com/ok</link></item>
              </channel>
            </rss>"#,
        );

        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].url, "https://example.com/ok");
    }

    #[test]
    fn test_media_thumbnail_becomes_cover() {
        let feed = parse(
            r#"<?xml version="1.0"?>
            <rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
              <channel>
                <title>Example</title>
                <item>
                  <title>With Cover</title>
                  <link>https://example.com/cover-post</link>
                  <media:thumbnail url="https://example.com/thumb.jpg" width="300" height="200"/>
                </item>
              </channel>
            </rss>"#,
        );

        assert_eq!(
            feed.items[0].cover_image_url.as_deref(),
            Some("https://example.com/thumb.jpg")
        );
    }

    #[test]
    fn test_parse_error_is_fatal() {
        let err = FeedError::Parse("bad xml".to_string());
        assert!(!err.should_retry());
        assert!(FeedError::Timeout.should_retry());
        assert!(
            FeedError::Http {
                status: StatusCode::SERVICE_UNAVAILABLE,
                retryable: true
            }
            .should_retry()
        );
    }
}
