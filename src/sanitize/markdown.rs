use kuchiki::NodeRef;
use kuchiki::traits::*;

use crate::sanitize::clean::{has_header_cell, serialize_body};

const TABLE_MARKER_OPEN: &str = "%%table-";
const TABLE_MARKER_CLOSE: &str = "%%";

/// Convert sanitized HTML to Markdown.
///
/// Genuine (header-bearing) tables are kept as literal HTML because pipe
/// tables cannot express rowspan or nested block content; everything else
/// becomes standard Markdown constructs.
pub fn markdown_from_html(html: &str) -> String {
    let document = kuchiki::parse_html().one(html);
    let mut preserved: Vec<String> = Vec::new();

    if let Ok(matches) = document.select("table") {
        let tables: Vec<NodeRef> = matches.map(|m| m.as_node().clone()).collect();
        for table in tables {
            if !has_header_cell(&table) || is_nested_table(&table) {
                continue;
            }
            let mut raw = Vec::new();
            if table.serialize(&mut raw).is_err() {
                continue;
            }
            let Ok(raw) = String::from_utf8(raw) else {
                continue;
            };
            let marker = table_marker(preserved.len());
            table.insert_before(NodeRef::new_text(marker));
            table.detach();
            preserved.push(raw);
        }
    }

    let mut markdown = htmd::convert(&serialize_body(&document)).unwrap_or_default();
    for (index, raw) in preserved.iter().enumerate() {
        markdown = markdown.replace(&table_marker(index), raw);
    }
    markdown.trim().to_string()
}

fn table_marker(index: usize) -> String {
    format!("{TABLE_MARKER_OPEN}{index}{TABLE_MARKER_CLOSE}")
}

fn is_nested_table(table: &NodeRef) -> bool {
    // Tables inside a preserved table travel with their parent's raw HTML.
    table
        .ancestors()
        .any(|a| a.as_element().is_some_and(|e| &*e.name.local == "table"))
}
