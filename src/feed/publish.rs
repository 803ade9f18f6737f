//! Re-publishing of ingested items as a feed of their own.
//!
//! The documents are built with the same models used for parsing, so the
//! output reads back through [`parse_feed`](super::parse_feed).

use chrono::{DateTime, Utc};

use super::atom::{AtomDocument, AtomEntry, AtomGenerator, AtomLink, AtomText};
use super::rss::{RssDocument, RssGuid, RssItem};
use crate::storage::StoredItem;

const GENERATOR: &str = "feedmill";

fn newest_first(items: &[StoredItem]) -> Vec<&StoredItem> {
    let mut sorted: Vec<&StoredItem> = items.iter().collect();
    sorted.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    sorted
}

/// RSS 2.0 channel of `items`, newest first.
///
/// GUIDs carry the item's external id and are marked as not permalinks,
/// since external ids are opaque.
pub fn rss_document(
    title: &str,
    link: &str,
    items: &[StoredItem],
    built_at: DateTime<Utc>,
) -> RssDocument {
    RssDocument {
        title: title.to_string(),
        link: link.to_string(),
        description: title.to_string(),
        last_build_date: built_at.to_rfc2822(),
        generator: GENERATOR.to_string(),
        items: newest_first(items)
            .into_iter()
            .map(|item| RssItem {
                title: item.title.clone(),
                link: item.link.clone(),
                description: item.content.clone(),
                pub_date: item.published_at.to_rfc2822(),
                guid: Some(RssGuid {
                    value: item.external_id.clone(),
                    is_perma_link: false,
                }),
                ..RssItem::default()
            })
            .collect(),
        ..RssDocument::default()
    }
}

/// Atom feed of `items`, newest first, with HTML content.
pub fn atom_document(
    title: &str,
    link: &str,
    items: &[StoredItem],
    updated: DateTime<Utc>,
) -> AtomDocument {
    let links = if link.is_empty() {
        Vec::new()
    } else {
        vec![alternate(link)]
    };
    AtomDocument {
        id: if link.is_empty() {
            format!("urn:{GENERATOR}")
        } else {
            link.to_string()
        },
        title: AtomText::plain(title),
        updated: updated.to_rfc3339(),
        links,
        generator: Some(AtomGenerator {
            name: GENERATOR.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uri: String::new(),
        }),
        entries: newest_first(items)
            .into_iter()
            .map(|item| AtomEntry {
                id: item.external_id.clone(),
                title: AtomText::plain(item.title.as_str()),
                updated: item.published_at.to_rfc3339(),
                published: item.published_at.to_rfc3339(),
                content: Some(AtomText::html(item.content.as_str())),
                links: if item.link.is_empty() {
                    Vec::new()
                } else {
                    vec![alternate(&item.link)]
                },
                ..AtomEntry::default()
            })
            .collect(),
        ..AtomDocument::default()
    }
}

fn alternate(href: &str) -> AtomLink {
    AtomLink {
        href: href.to_string(),
        rel: "alternate".to_string(),
        ..AtomLink::default()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::feed::{parse_feed, SourceFormat};

    fn stored(id: i64, external_id: &str, day: u32) -> StoredItem {
        StoredItem {
            id,
            feed_id: 1,
            external_id: external_id.to_string(),
            title: format!("Post {external_id}"),
            content: "<p>Hello &amp; welcome</p>".to_string(),
            link: format!("https://blog.example/{external_id}"),
            published_at: Utc.with_ymd_and_hms(2024, 5, day, 8, 0, 0).unwrap(),
            fetched_at: Utc.with_ymd_and_hms(2024, 5, 20, 0, 0, 0).unwrap(),
        }
    }

    fn items() -> Vec<StoredItem> {
        vec![stored(1, "old", 1), stored(2, "new", 9), stored(3, "mid", 5)]
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_rss_document_orders_newest_first() {
        let doc = rss_document("Reader", "https://reader.example/", &items(), now());
        let ids: Vec<&str> = doc.items.iter().map(|i| i.id()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
        assert_eq!(doc.items[0].pub_date, "Thu, 9 May 2024 08:00:00 +0000");
        assert!(!doc.items[0].guid.as_ref().unwrap().is_perma_link);
    }

    #[test]
    fn test_rss_output_parses_back() {
        let doc = rss_document("Reader", "https://reader.example/", &items(), now());
        let feed = parse_feed(&doc.to_xml().unwrap()).unwrap();

        assert_eq!(feed.format, SourceFormat::Rss);
        assert_eq!(feed.title, "Reader");
        assert_eq!(feed.items.len(), 3);
        assert_eq!(feed.items[0].external_id, "new");
        assert_eq!(feed.items[0].description, "<p>Hello &amp; welcome</p>");
        assert_eq!(
            feed.items[0].published_at,
            Utc.with_ymd_and_hms(2024, 5, 9, 8, 0, 0).unwrap()
        );
        assert_eq!(feed.undated_items, 0);
    }

    #[test]
    fn test_atom_output_parses_back() {
        let doc = atom_document("Reader", "https://reader.example/", &items(), now());
        let feed = parse_feed(&doc.to_xml().unwrap()).unwrap();

        assert_eq!(feed.format, SourceFormat::Atom);
        assert_eq!(feed.link, "https://reader.example/");
        let ids: Vec<&str> = feed.items.iter().map(|i| i.external_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
        assert_eq!(feed.items[2].link, "https://blog.example/old");
        assert_eq!(feed.items[2].description, "<p>Hello &amp; welcome</p>");
    }

    #[test]
    fn test_atom_document_without_link() {
        let doc = atom_document("Reader", "", &[], now());
        assert_eq!(doc.id, "urn:feedmill");
        assert!(doc.links.is_empty());
        assert!(doc.entries.is_empty());
        assert_eq!(doc.updated, "2024-05-20T12:00:00+00:00");
    }
}
