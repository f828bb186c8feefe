//! Cover image caching.
//!
//! Downloads a document's cover image into blob storage so the reader stops
//! depending on the origin staying up. Terminal conditions come back as an
//! [`ImageCacheOutcome`]; only transient fetch failures surface as errors so
//! the queue retries them.

use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::blobs::BlobStoreTrait;
use crate::store::DocumentStoreTrait;

const MAX_IMAGE_SIZE: u64 = 5 * 1024 * 1024; // 5MB

/// Content types worth caching, with the file extension each one gets.
/// SVG stays out: scriptable markup is not a bitmap.
const ALLOWED_IMAGE_TYPES: [(&str, &str); 5] = [
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/avif", "avif"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageCacheOutcome {
    Cached { key: String },
    AlreadyCached,
    DocumentMissing,
    NoCoverImage,
    Rejected { reason: String },
}

#[instrument(skip(store, blobs, http), fields(document_id = %document_id))]
pub async fn cache_cover_image(
    store: &dyn DocumentStoreTrait,
    blobs: &dyn BlobStoreTrait,
    http: &reqwest::Client,
    document_id: Uuid,
) -> anyhow::Result<ImageCacheOutcome> {
    let Some(document) = store.get_document(document_id).await? else {
        return Ok(ImageCacheOutcome::DocumentMissing);
    };
    if document.cover_image_key.is_some() {
        return Ok(ImageCacheOutcome::AlreadyCached);
    }
    let Some(url) = document.cover_image_url.clone() else {
        return Ok(ImageCacheOutcome::NoCoverImage);
    };

    // Transport failures and timeouts bubble up for redelivery.
    let response = http.get(&url).send().await?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        anyhow::bail!("cover image fetch failed with status {status}");
    }
    if !status.is_success() {
        return Ok(ImageCacheOutcome::Rejected {
            reason: format!("status {status}"),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .unwrap_or_default();
    let Some(extension) = extension_for(&content_type) else {
        return Ok(ImageCacheOutcome::Rejected {
            reason: format!("unsupported content type {content_type:?}"),
        });
    };

    if let Some(length) = response.content_length()
        && length > MAX_IMAGE_SIZE
    {
        return Ok(ImageCacheOutcome::Rejected {
            reason: format!("image is {length} bytes"),
        });
    }
    let bytes = response.bytes().await?;
    if bytes.len() as u64 > MAX_IMAGE_SIZE {
        return Ok(ImageCacheOutcome::Rejected {
            reason: format!("image is {} bytes", bytes.len()),
        });
    }

    let key = format!("covers/{:x}.{extension}", md5::compute(&url));
    blobs.put(&key, bytes, &content_type).await?;
    store.set_cover_image_key(document_id, &key).await?;
    info!(key, "cover image cached");

    Ok(ImageCacheOutcome::Cached { key })
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    ALLOWED_IMAGE_TYPES
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, ext)| *ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobs::MockBlobStoreTrait;
    use crate::entities::{Document, DocumentSource};
    use crate::store::MockDocumentStoreTrait;
    use chrono::Utc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn document_with_cover(id: Uuid, cover_url: Option<String>) -> Document {
        Document {
            id,
            user_id: Uuid::new_v4(),
            feed_id: None,
            url: Some("https://example.com/a".to_string()),
            normalized_url: Some("https://example.com/a".to_string()),
            title: Some("a".to_string()),
            author: None,
            site_name: None,
            excerpt: None,
            html_content: None,
            markdown_content: None,
            plain_text_content: None,
            cover_image_url: cover_url,
            cover_image_key: None,
            lang: None,
            word_count: None,
            reading_time_minutes: None,
            published_at: None,
            source: DocumentSource::Rss,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_already_cached_short_circuits() {
        let mut store = MockDocumentStoreTrait::new();
        store.expect_get_document().returning(|id| {
            let mut doc = document_with_cover(id, Some("https://example.com/c.jpg".to_string()));
            doc.cover_image_key = Some("covers/cached.jpg".to_string());
            Ok(Some(doc))
        });
        let blobs = MockBlobStoreTrait::new();
        let http = reqwest::Client::new();

        let outcome = cache_cover_image(&store, &blobs, &http, Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(outcome, ImageCacheOutcome::AlreadyCached);
    }

    #[tokio::test]
    async fn test_missing_document_and_missing_url() {
        let mut store = MockDocumentStoreTrait::new();
        store.expect_get_document().times(1).returning(|_| Ok(None));
        let blobs = MockBlobStoreTrait::new();
        let http = reqwest::Client::new();
        let outcome = cache_cover_image(&store, &blobs, &http, Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(outcome, ImageCacheOutcome::DocumentMissing);

        let mut store = MockDocumentStoreTrait::new();
        store
            .expect_get_document()
            .returning(|id| Ok(Some(document_with_cover(id, None))));
        let outcome = cache_cover_image(&store, &blobs, &http, Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(outcome, ImageCacheOutcome::NoCoverImage);
    }

    #[tokio::test]
    async fn test_caches_jpeg_and_records_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cover.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0]),
            )
            .mount(&server)
            .await;

        let cover_url = format!("{}/cover.jpg", server.uri());
        let mut store = MockDocumentStoreTrait::new();
        {
            let cover_url = cover_url.clone();
            store
                .expect_get_document()
                .returning(move |id| Ok(Some(document_with_cover(id, Some(cover_url.clone())))));
        }
        store
            .expect_set_cover_image_key()
            .withf(|_, key| key.starts_with("covers/") && key.ends_with(".jpg"))
            .times(1)
            .returning(|_, _| Ok(()));

        let mut blobs = MockBlobStoreTrait::new();
        blobs
            .expect_put()
            .withf(|key, bytes, content_type| {
                key.starts_with("covers/") && !bytes.is_empty() && content_type == "image/jpeg"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let http = reqwest::Client::new();
        let outcome = cache_cover_image(&store, &blobs, &http, Uuid::new_v4())
            .await
            .unwrap();
        assert!(matches!(outcome, ImageCacheOutcome::Cached { key } if key.ends_with(".jpg")));
    }

    #[tokio::test]
    async fn test_svg_is_rejected_without_store_write() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logo.svg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/svg+xml")
                    .set_body_string("<svg></svg>"),
            )
            .mount(&server)
            .await;

        let cover_url = format!("{}/logo.svg", server.uri());
        let mut store = MockDocumentStoreTrait::new();
        store
            .expect_get_document()
            .returning(move |id| Ok(Some(document_with_cover(id, Some(cover_url.clone())))));
        // No expect_set_cover_image_key and no blob expectations: any write
        // would panic the test.
        let blobs = MockBlobStoreTrait::new();

        let http = reqwest::Client::new();
        let outcome = cache_cover_image(&store, &blobs, &http, Uuid::new_v4())
            .await
            .unwrap();
        assert!(matches!(outcome, ImageCacheOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_server_error_propagates_for_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cover.jpg"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let cover_url = format!("{}/cover.jpg", server.uri());
        let mut store = MockDocumentStoreTrait::new();
        store
            .expect_get_document()
            .returning(move |id| Ok(Some(document_with_cover(id, Some(cover_url.clone())))));
        let blobs = MockBlobStoreTrait::new();

        let http = reqwest::Client::new();
        let result = cache_cover_image(&store, &blobs, &http, Uuid::new_v4()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_plain_404_is_terminal_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let cover_url = format!("{}/gone.png", server.uri());
        let mut store = MockDocumentStoreTrait::new();
        store
            .expect_get_document()
            .returning(move |id| Ok(Some(document_with_cover(id, Some(cover_url.clone())))));
        let blobs = MockBlobStoreTrait::new();

        let http = reqwest::Client::new();
        let outcome = cache_cover_image(&store, &blobs, &http, Uuid::new_v4())
            .await
            .unwrap();
        assert!(matches!(outcome, ImageCacheOutcome::Rejected { .. }));
    }
}
