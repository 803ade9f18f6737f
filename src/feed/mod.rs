//! Feed documents: decoding, normalization, retrieval and re-publishing.
//!
//! - [`atom`], [`rss`] and [`opml`] are document models with symmetric
//!   XML decoding and encoding
//! - [`parse_feed`] detects the format and converts either model into the
//!   canonical [`Feed`]
//! - [`clean`] and [`parse_timestamp`] normalize item bodies and dates
//! - [`Fetcher`] retrieves documents over HTTP
//! - [`publish`] turns stored items back into RSS or Atom
//!
//! # Example
//!
//! ```
//! use feedmill::feed::{parse_feed, SourceFormat};
//!
//! let xml = br#"<rss version="2.0"><channel><title>Blog</title>
//!   <item><guid>a1</guid><title>Hello</title></item>
//! </channel></rss>"#;
//! let feed = parse_feed(xml).unwrap();
//! assert_eq!(feed.format, SourceFormat::Rss);
//! assert_eq!(feed.items[0].external_id, "a1");
//! ```

pub mod atom;
mod clean;
mod fetcher;
pub mod opml;
mod parser;
pub mod publish;
pub mod rss;
mod timestamp;
mod xml;

pub use clean::clean;
pub use fetcher::{FetchError, Fetcher};
pub use opml::{parse_opml, serialize_opml, OpmlDocument, Outline};
pub use parser::{
    detect, parse_feed, parse_feed_at, Detected, Feed, FeedItem, FormatError, SourceFormat,
};
pub use timestamp::{parse_timestamp, Layout, TimestampError};
pub use xml::ParseError;

/// `Content-Type` for XML documents this crate produces.
pub const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";
