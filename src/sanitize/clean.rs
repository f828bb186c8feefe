use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use ammonia::Builder;
use kuchiki::NodeRef;
use kuchiki::traits::*;
use url::Url;

/// Removed together with their children; everything else not on the allow
/// list is unwrapped instead.
const BLOCKED_TAGS: [&str; 18] = [
    "script", "style", "iframe", "form", "button", "input", "select", "option", "textarea",
    "noscript", "object", "embed", "svg", "canvas", "audio", "video", "dialog", "template",
];

const ALLOWED_TAGS: [&str; 46] = [
    "a",
    "abbr",
    "b",
    "blockquote",
    "br",
    "caption",
    "code",
    "dd",
    "del",
    "dl",
    "dt",
    "em",
    "figcaption",
    "figure",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "hr",
    "i",
    "img",
    "ins",
    "kbd",
    "li",
    "mark",
    "ol",
    "p",
    "pre",
    "q",
    "s",
    "small",
    "strong",
    "sub",
    "sup",
    "table",
    "tbody",
    "td",
    "tfoot",
    "th",
    "thead",
    "time",
    "tr",
    "u",
    "ul",
];

/// Hosts that only ever serve tracking beacons. Matches the host exactly or
/// any subdomain of it.
const TRACKER_HOSTS: [&str; 10] = [
    "doubleclick.net",
    "google-analytics.com",
    "googletagmanager.com",
    "googlesyndication.com",
    "scorecardresearch.com",
    "quantserve.com",
    "pixel.wp.com",
    "list-manage.com",
    "mailstat.us",
    "branch.io",
];

/// Zero-width and soft-hyphen style characters used by newsletters to defeat
/// text matching. Stripped from every text node.
const INVISIBLE_CHARS: [char; 7] = [
    '\u{200B}', // zero width space
    '\u{200C}', // zero width non-joiner
    '\u{200D}', // zero width joiner
    '\u{034F}', // combining grapheme joiner
    '\u{00AD}', // soft hyphen
    '\u{2060}', // word joiner
    '\u{FEFF}', // byte order mark
];

static CLEANER: LazyLock<Builder<'static>> = LazyLock::new(|| {
    let mut tag_attributes: HashMap<&str, HashSet<&str>> = HashMap::new();
    tag_attributes.insert("a", ["href", "title"].into_iter().collect());
    tag_attributes.insert(
        "img",
        ["src", "alt", "title", "width", "height"].into_iter().collect(),
    );
    tag_attributes.insert("td", ["colspan", "rowspan"].into_iter().collect());
    tag_attributes.insert("th", ["colspan", "rowspan", "scope"].into_iter().collect());
    tag_attributes.insert("blockquote", ["cite"].into_iter().collect());
    tag_attributes.insert("q", ["cite"].into_iter().collect());
    tag_attributes.insert("ol", ["start"].into_iter().collect());
    tag_attributes.insert("time", ["datetime"].into_iter().collect());

    let mut builder = Builder::default();
    builder
        .tags(ALLOWED_TAGS.into_iter().collect())
        .tag_attributes(tag_attributes)
        .generic_attributes(HashSet::new())
        // `cid:` survives here so email attachments can be rewritten later
        .url_schemes(["http", "https", "mailto", "cid"].into_iter().collect())
        .link_rel(None);
    builder
});

/// Clean raw HTML down to the allow-listed tag and attribute set.
///
/// Structural rewrites (blocked subtrees, tracking pixels, invisible
/// characters, layout tables) run on a parsed tree first; the allow-list
/// pass then unwraps every remaining unknown wrapper and strips unknown
/// attributes, including all `on*` handlers.
pub fn sanitize_html(html: &str) -> String {
    let document = kuchiki::parse_html().one(html);
    remove_blocked_elements(&document);
    remove_tracking_pixels(&document);
    strip_invisible_text(&document);
    unwrap_layout_tables(&document);
    CLEANER.clean(&serialize_body(&document)).to_string()
}

/// Rewrite `cid:` image references to their stored attachment paths.
///
/// `attachments` maps a content id to a storage key. References without a
/// mapping are left untouched.
pub fn rewrite_cid_images(html: &str, attachments: &HashMap<String, String>) -> String {
    let document = kuchiki::parse_html().one(html);
    let Ok(images) = document.select("img") else {
        return html.to_string();
    };
    for img in images {
        let mut attrs = img.attributes.borrow_mut();
        let rewritten = attrs
            .get("src")
            .and_then(|src| src.strip_prefix("cid:"))
            .and_then(|content_id| attachments.get(content_id))
            .map(|key| format!("/attachments/{key}"));
        if let Some(path) = rewritten {
            attrs.insert("src", path);
        }
    }
    serialize_body(&document)
}

fn remove_blocked_elements(document: &NodeRef) {
    let selector = BLOCKED_TAGS.join(",");
    let Ok(matches) = document.select(&selector) else {
        return;
    };
    let doomed: Vec<NodeRef> = matches.map(|m| m.as_node().clone()).collect();
    for node in doomed {
        node.detach();
    }
}

fn remove_tracking_pixels(document: &NodeRef) {
    let Ok(images) = document.select("img") else {
        return;
    };
    let mut doomed = Vec::new();
    for img in images {
        let attrs = img.attributes.borrow();
        let pixel_sized = matches!(attrs.get("width"), Some("0" | "1"))
            || matches!(attrs.get("height"), Some("0" | "1"));
        let tracker_src = attrs.get("src").is_some_and(is_tracker_url);
        drop(attrs);
        if pixel_sized || tracker_src {
            doomed.push(img.as_node().clone());
        }
    }
    for node in doomed {
        node.detach();
    }
}

fn is_tracker_url(src: &str) -> bool {
    let Ok(url) = Url::parse(src) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    TRACKER_HOSTS
        .iter()
        .any(|tracker| host == *tracker || host.ends_with(&format!(".{tracker}")))
}

fn strip_invisible_text(document: &NodeRef) {
    let mut doomed = Vec::new();
    for node in document.descendants() {
        if let Some(text) = node.as_text() {
            let mut contents = text.borrow_mut();
            if contents.contains(&INVISIBLE_CHARS[..]) {
                let stripped: String = contents
                    .chars()
                    .filter(|c| !INVISIBLE_CHARS.contains(c))
                    .collect();
                *contents = stripped;
            }
            if contents.is_empty() {
                doomed.push(node.clone());
            }
        }
    }
    for node in doomed {
        node.detach();
    }
}

/// Unwrap tables used for layout, keeping their cell contents in place.
///
/// A table with no `th` anywhere inside it is classified as layout. Each
/// pass only unwraps layout tables that contain no further table, so nested
/// layout tables collapse from the inside out; the loop re-scans until the
/// tree stops changing.
fn unwrap_layout_tables(document: &NodeRef) {
    loop {
        let mut changed = false;
        let Ok(matches) = document.select("table") else {
            return;
        };
        let tables: Vec<NodeRef> = matches.map(|m| m.as_node().clone()).collect();
        for table in tables {
            if has_header_cell(&table) || contains_nested_table(&table) {
                continue;
            }
            unwrap_table(&table);
            changed = true;
        }
        if !changed {
            break;
        }
    }
}

pub(crate) fn has_header_cell(table: &NodeRef) -> bool {
    table
        .select("th")
        .map(|mut matches| matches.next().is_some())
        .unwrap_or(false)
}

fn contains_nested_table(table: &NodeRef) -> bool {
    // node.select matches inclusive descendants, so skip the table itself
    table
        .select("table")
        .map(|mut matches| matches.any(|m| m.as_node() != table))
        .unwrap_or(false)
}

fn unwrap_table(table: &NodeRef) {
    let mut promoted = Vec::new();
    if let Ok(cells) = table.select("td, caption") {
        for cell in cells {
            let mut child = cell.as_node().first_child();
            while let Some(node) = child {
                child = node.next_sibling();
                promoted.push(node);
            }
        }
    }
    // insert_before detaches from the old position first, so this moves each
    // cell's content out in document order
    for node in promoted {
        table.insert_before(node);
    }
    table.detach();
}

pub(crate) fn serialize_body(document: &NodeRef) -> String {
    let Ok(body) = document.select_first("body") else {
        return String::new();
    };
    let mut out = Vec::new();
    for child in body.as_node().children() {
        if child.serialize(&mut out).is_err() {
            return String::new();
        }
    }
    String::from_utf8(out).unwrap_or_default()
}
