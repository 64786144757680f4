// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Only the start of a document is inspected
const SNIFF_BYTES: usize = 128 * 1024;

/// Cheap check that a response body is feed XML and not, say, an HTML
/// error page served with a 200 status.
pub fn looks_like_feed_xml(content: &[u8]) -> bool {
    if content.is_empty() {
        return false;
    }

    let head = &content[..content.len().min(SNIFF_BYTES)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start().to_lowercase();

    if text.is_empty() {
        return false;
    }
    if text.starts_with("<!doctype html") || text.starts_with("<html") {
        return false;
    }
    if text.contains("<rss") || text.contains("<feed") || text.contains("<rdf:rdf") {
        return true;
    }
    text.contains("<channel") && (text.contains("<item") || text.contains("<enclosure"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_rss() {
        assert!(looks_like_feed_xml(
            b"<?xml version=\"1.0\"?>\n<rss version=\"2.0\"><channel></channel></rss>"
        ));
    }

    #[test]
    fn accepts_atom_with_leading_whitespace_and_bom() {
        let doc = "\u{feff}\n  <feed xmlns=\"http://www.w3.org/2005/Atom\"></feed>";
        assert!(looks_like_feed_xml(doc.as_bytes()));
    }

    #[test]
    fn accepts_rdf() {
        assert!(looks_like_feed_xml(b"<rdf:RDF xmlns:rdf=\"x\"></rdf:RDF>"));
    }

    #[test]
    fn accepts_bare_channel_with_items() {
        assert!(looks_like_feed_xml(b"<channel><item><title>x</title></item></channel>"));
    }

    #[test]
    fn rejects_html_pages() {
        assert!(!looks_like_feed_xml(
            b"<!DOCTYPE html><html><body>404 Not Found</body></html>"
        ));
        assert!(!looks_like_feed_xml(b"<html><head><title>rss</title></head></html>"));
    }

    #[test]
    fn rejects_empty_and_unrelated_bodies() {
        assert!(!looks_like_feed_xml(b""));
        assert!(!looks_like_feed_xml(b"   \n\t"));
        assert!(!looks_like_feed_xml(b"{\"error\": \"not found\"}"));
        assert!(!looks_like_feed_xml(b"<channel>no items</channel>"));
    }
}
