//! Bulk subscription management through OPML.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::feed::{parse_opml, serialize_opml, Outline, ParseError, SourceFormat};
use crate::storage::{FeedStore, StoreError};
use crate::util::UrlPolicy;

/// A user-initiated import failed as a whole.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Invalid OPML document: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Outlines stored as subscriptions, new or already present.
    pub imported: usize,
    /// Outlines whose feed URL was refused by the URL policy.
    pub skipped: usize,
}

/// Subscribes to every feed outline in an OPML document.
///
/// Outlines with a URL the policy refuses are skipped and logged. The
/// outline's `type` becomes the initial format, defaulting to RSS; the first
/// poll records the actual one. Importing the same document twice leaves one
/// subscription per feed URL.
///
/// # Errors
///
/// Malformed OPML fails before anything is stored. A store error aborts the
/// import; outlines stored before it remain.
pub async fn import_opml<S: FeedStore>(
    store: &S,
    bytes: &[u8],
    policy: &UrlPolicy,
) -> Result<ImportReport, ImportError> {
    let document = parse_opml(bytes)?;
    let mut report = ImportReport::default();

    for outline in &document.outlines {
        if let Err(e) = policy.validate(&outline.xml_url) {
            tracing::warn!(url = %outline.xml_url, error = %e, "Skipping OPML outline");
            report.skipped += 1;
            continue;
        }

        let format = SourceFormat::from_hint(&outline.kind).unwrap_or(SourceFormat::Rss);
        store
            .create_feed(
                format,
                &outline.title,
                outline.html_url.as_deref().unwrap_or(""),
                &outline.xml_url,
            )
            .await?;
        report.imported += 1;
    }

    tracing::info!(
        imported = report.imported,
        skipped = report.skipped,
        "OPML import finished"
    );
    Ok(report)
}

/// Serializes every subscription as an OPML 2.0 document.
pub async fn export_opml<S: FeedStore>(
    store: &S,
    title: &str,
    created_at: DateTime<Utc>,
) -> Result<Vec<u8>> {
    let outlines: Vec<Outline> = store
        .list_feeds()
        .await
        .context("Failed to list subscriptions")?
        .into_iter()
        .map(|feed| Outline {
            kind: feed.format.as_str().to_string(),
            title: feed.title,
            xml_url: feed.feed_link,
            html_url: Some(feed.home_link).filter(|link| !link.is_empty()),
        })
        .collect();
    serialize_opml(title, created_at, &outlines)
}
