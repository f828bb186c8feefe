use std::sync::LazyLock;

use encoding_rs::Encoding;
use regex::Regex;

use crate::fetch::errors::FetchError;

static HEADER_CHARSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)charset\s*=\s*["']?([^"'\s;]+)"#).unwrap());

// Matches both <meta charset="..."> and the http-equiv form, whose content
// attribute also contains a charset= token.
static META_CHARSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<meta\s+[^>]*?charset\s*=\s*["']?([^"'\s;/>]+)"#).unwrap());

/// Decode a response body to UTF-8.
///
/// Charset resolution order: Content-Type header, `<meta>` declarations in
/// the first 4KB, then statistical detection.
pub(crate) fn decode_body(bytes: &[u8], content_type: &str) -> Result<String, FetchError> {
    let encoding = sniff_encoding(bytes, content_type);
    let (decoded, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(FetchError::Charset(encoding.name().to_string()));
    }
    Ok(decoded.into_owned())
}

fn sniff_encoding(bytes: &[u8], content_type: &str) -> &'static Encoding {
    if let Some(encoding) = label_from(content_type, &HEADER_CHARSET) {
        return encoding;
    }

    let head = &bytes[..bytes.len().min(4096)];
    let head_str = String::from_utf8_lossy(head);
    if let Some(encoding) = label_from(&head_str, &META_CHARSET) {
        return encoding;
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(head, false);
    detector.guess(None, true)
}

fn label_from(haystack: &str, pattern: &Regex) -> Option<&'static Encoding> {
    let captures = pattern.captures(haystack)?;
    let label = captures.get(1)?.as_str();
    Encoding::for_label(label.trim().as_bytes())
}
