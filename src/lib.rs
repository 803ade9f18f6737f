//! Feed ingestion engine: RSS, Atom and OPML models, format detection,
//! content and timestamp normalization, and periodic polling into a store.

pub mod config;
pub mod feed;
pub mod ingest;
pub mod storage;
pub mod util;
