use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::atom::{self, AtomDocument};
use super::clean::clean;
use super::rss::{self, RssDocument};
use super::timestamp::parse_timestamp;
use super::xml::ParseError;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Syndication format a feed was detected as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Rss,
    Atom,
}

impl SourceFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceFormat::Rss => "rss",
            SourceFormat::Atom => "atom",
        }
    }

    /// Parses a stored or user-supplied format hint. Unknown hints yield `None`.
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint.trim().to_ascii_lowercase().as_str() {
            "rss" => Some(SourceFormat::Rss),
            "atom" => Some(SourceFormat::Atom),
            _ => None,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The bytes are neither RSS nor Atom.
///
/// Carries why each format was rejected, for logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a valid RSS or Atom document")]
pub struct FormatError {
    pub rss: String,
    pub atom: String,
}

/// Outcome of format detection.
#[derive(Debug)]
pub enum Detected {
    Rss(RssDocument),
    Atom(AtomDocument),
    Invalid(FormatError),
}

/// Canonical feed, independent of the source format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feed {
    pub format: SourceFormat,
    pub title: String,
    /// Site home page, not the feed URL.
    pub link: String,
    /// Items in document order.
    pub items: Vec<FeedItem>,
    /// Items whose publication date could not be parsed and was replaced by
    /// the fallback time.
    pub undated_items: usize,
    /// The document was cut short by malformed XML; `items` holds what was
    /// read before the error.
    pub truncated: bool,
}

/// Canonical feed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    /// Never empty.
    pub external_id: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
}

/// Determines whether `bytes` hold RSS or Atom.
///
/// Strips a UTF-8 BOM, then tries RSS, then Atom; the first success wins. An
/// Atom document with no feed-level `<link>` is rejected because it cannot
/// provide a site link.
pub fn detect(bytes: &[u8]) -> Detected {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let rss_error = match rss::parse(bytes) {
        Ok(doc) => return Detected::Rss(doc),
        Err(e) => e,
    };

    let atom_error = match atom::parse(bytes) {
        Ok(doc) if doc.links.is_empty() => ParseError::MissingElement("link"),
        Ok(doc) => return Detected::Atom(doc),
        Err(e) => e,
    };

    Detected::Invalid(FormatError {
        rss: rss_error.to_string(),
        atom: atom_error.to_string(),
    })
}

/// Parses raw feed bytes into a canonical [`Feed`].
///
/// Items whose publication date cannot be parsed are stamped with the current
/// time; see [`parse_feed_at`] for a deterministic variant.
pub fn parse_feed(bytes: &[u8]) -> Result<Feed, FormatError> {
    parse_feed_at(bytes, Utc::now())
}

/// Like [`parse_feed`], using `fallback` for items without a usable date.
pub fn parse_feed_at(bytes: &[u8], fallback: DateTime<Utc>) -> Result<Feed, FormatError> {
    match detect(bytes) {
        Detected::Rss(doc) => Ok(from_rss(doc, fallback)),
        Detected::Atom(doc) => Ok(from_atom(doc, fallback)),
        Detected::Invalid(e) => Err(e),
    }
}

fn from_rss(doc: RssDocument, fallback: DateTime<Utc>) -> Feed {
    let mut undated = 0;
    let items = doc
        .items
        .iter()
        .map(|item| {
            let title = clean(&item.title);
            let external_id = external_id(item.id(), &item.link, &title, &item.pub_date);
            FeedItem {
                external_id,
                published_at: published_at(&item.pub_date, fallback, &mut undated),
                description: clean(&item.get_content()),
                link: item.link.trim().to_string(),
                title,
            }
        })
        .collect();

    Feed {
        format: SourceFormat::Rss,
        title: doc.title.trim().to_string(),
        link: doc.link.trim().to_string(),
        items,
        undated_items: undated,
        truncated: doc.truncated,
    }
}

fn from_atom(doc: AtomDocument, fallback: DateTime<Utc>) -> Feed {
    let mut undated = 0;
    let items = doc
        .entries
        .iter()
        .map(|entry| {
            let title = clean(&entry.title.body);
            let link = atom::best_link(&entry.links).trim().to_string();
            let raw_date = if entry.published.trim().is_empty() {
                &entry.updated
            } else {
                &entry.published
            };
            FeedItem {
                external_id: external_id(&entry.id, &link, &title, raw_date),
                published_at: published_at(raw_date, fallback, &mut undated),
                description: clean(entry.get_content()),
                link,
                title,
            }
        })
        .collect();

    Feed {
        format: SourceFormat::Atom,
        title: doc.title.body.trim().to_string(),
        link: atom::best_link(&doc.links).trim().to_string(),
        items,
        undated_items: undated,
        truncated: doc.truncated,
    }
}

fn published_at(raw: &str, fallback: DateTime<Utc>, undated: &mut usize) -> DateTime<Utc> {
    match parse_timestamp(raw) {
        Ok(ts) => ts,
        Err(e) => {
            tracing::debug!(error = %e, "Using fallback time for item");
            *undated += 1;
            fallback
        }
    }
}

/// Returns the trimmed source identifier, or a SHA-256 digest of the item's
/// link, title and raw date when the source has none.
fn external_id(existing: &str, link: &str, title: &str, raw_date: &str) -> String {
    let trimmed = existing.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    let input = format!("{}|{}|{}", link, title, raw_date.trim());
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn fallback() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title> My Blog </title>
    <link>https://blog.example/</link>
    <item>
      <title><![CDATA[First <!-- draft --> post]]></title>
      <link>https://blog.example/1</link>
      <guid>post-1</guid>
      <description><![CDATA[<!-- lead --><p>Hello</p>]]></description>
      <pubDate>Sun, 15 Jan 2023 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Second</title>
      <link>https://blog.example/2</link>
      <description>plain</description>
      <pubDate>yesterday-ish</pubDate>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Site</title>
  <link rel="self" href="https://atom.example/feed"/>
  <link rel="alternate" href="https://atom.example/"/>
  <id>urn:atom-site</id>
  <entry>
    <id>urn:entry:1</id>
    <title>Entry One</title>
    <link rel="alternate" href="https://atom.example/1"/>
    <updated>2023-01-16T00:00:00Z</updated>
    <published>2023-01-15T10:00:00Z</published>
    <summary>Summary one</summary>
  </entry>
  <entry>
    <id>urn:entry:2</id>
    <title>Entry Two</title>
    <updated>2023-02-01T12:00:00+01:00</updated>
    <content type="html">&lt;p&gt;Body two&lt;/p&gt;</content>
  </entry>
</feed>"#;

    #[test]
    fn test_rss_detected_and_converted() {
        let feed = parse_feed_at(RSS.as_bytes(), fallback()).unwrap();
        assert_eq!(feed.format, SourceFormat::Rss);
        assert_eq!(feed.title, "My Blog");
        assert_eq!(feed.link, "https://blog.example/");
        assert_eq!(feed.items.len(), 2);

        let first = &feed.items[0];
        assert_eq!(first.external_id, "post-1");
        assert_eq!(first.title, "First  post");
        assert_eq!(first.description, "<p>Hello</p>");
        assert_eq!(
            first.published_at,
            Utc.with_ymd_and_hms(2023, 1, 15, 10, 0, 0).unwrap()
        );

        let second = &feed.items[1];
        assert_eq!(second.external_id, "https://blog.example/2");
        assert_eq!(second.published_at, fallback());
        assert_eq!(feed.undated_items, 1);
    }

    #[test]
    fn test_atom_detected_and_converted() {
        let feed = parse_feed_at(ATOM.as_bytes(), fallback()).unwrap();
        assert_eq!(feed.format, SourceFormat::Atom);
        assert_eq!(feed.title, "Atom Site");
        assert_eq!(feed.link, "https://atom.example/");

        let first = &feed.items[0];
        assert_eq!(first.external_id, "urn:entry:1");
        assert_eq!(first.link, "https://atom.example/1");
        assert_eq!(first.description, "Summary one");
        // published wins over updated
        assert_eq!(
            first.published_at,
            Utc.with_ymd_and_hms(2023, 1, 15, 10, 0, 0).unwrap()
        );

        let second = &feed.items[1];
        assert_eq!(second.link, "");
        assert_eq!(second.description, "<p>Body two</p>");
        assert_eq!(
            second.published_at,
            Utc.with_ymd_and_hms(2023, 2, 1, 11, 0, 0).unwrap()
        );
        assert_eq!(feed.undated_items, 0);
    }

    #[test]
    fn test_bom_is_stripped() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(RSS.as_bytes());
        let feed = parse_feed_at(&bytes, fallback()).unwrap();
        assert_eq!(feed.format, SourceFormat::Rss);
    }

    #[test]
    fn test_atom_without_links_rejected() {
        let doc = br#"<feed xmlns="http://www.w3.org/2005/Atom"><title>No links</title>
            <entry><id>1</id><link href="https://x.test/1"/></entry></feed>"#;
        match detect(doc) {
            Detected::Invalid(e) => {
                assert_eq!(e.to_string(), "not a valid RSS or Atom document");
                assert!(e.atom.contains("link"), "{}", e.atom);
                assert!(e.rss.contains("feed"), "{}", e.rss);
            }
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_is_format_error() {
        assert!(parse_feed(b"").is_err());
        assert!(parse_feed(b"not xml at all").is_err());
        assert!(parse_feed(b"<html><body>hello</body></html>").is_err());
        assert!(parse_feed(br#"{"json": true}"#).is_err());
    }

    #[test]
    fn test_missing_ids_get_stable_digest() {
        let doc = br#"<rss><channel><title>t</title>
            <item><title>No id</title><pubDate>2023-01-01</pubDate></item>
            </channel></rss>"#;
        let a = parse_feed_at(doc, fallback()).unwrap();
        let b = parse_feed_at(doc, Utc::now()).unwrap();
        let id = &a.items[0].external_id;
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, &b.items[0].external_id);
    }

    #[test]
    fn test_reparse_is_identical() {
        let a = parse_feed_at(ATOM.as_bytes(), fallback()).unwrap();
        let b = parse_feed_at(ATOM.as_bytes(), fallback()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_backspace_in_description() {
        let doc = b"<rss version=\"2.0\"><channel><title>t</title><link>https://l/</link>\
            <item><guid>g</guid><description>bad\x08byte</description></item>\
            </channel></rss>";
        let feed = parse_feed_at(doc, fallback()).unwrap();
        assert_eq!(feed.items[0].description, "badbyte");
    }

    #[test]
    fn test_source_format_hint() {
        assert_eq!(SourceFormat::from_hint(" RSS "), Some(SourceFormat::Rss));
        assert_eq!(SourceFormat::from_hint("atom"), Some(SourceFormat::Atom));
        assert_eq!(SourceFormat::from_hint("json"), None);
        assert_eq!(SourceFormat::Atom.to_string(), "atom");
    }

    proptest! {
        #[test]
        fn test_random_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
            let _ = parse_feed_at(&bytes, fallback());
        }

        #[test]
        fn test_plain_text_is_invalid(s in "[a-zA-Z0-9 .,!?]{0,200}") {
            prop_assert!(parse_feed_at(s.as_bytes(), fallback()).is_err());
        }
    }
}
