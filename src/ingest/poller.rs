use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::Mutex;

use super::clock::{Clock, SystemClock};
use crate::feed::{parse_feed_at, Feed, FetchError, Fetcher, FormatError, SourceFormat};
use crate::storage::{FeedStore, StoreError, Subscription};

/// Why one feed could not be refreshed.
#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Feed {0} is not subscribed")]
    UnknownFeed(i64),
}

/// Result of ingesting one feed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedRefresh {
    pub format: SourceFormat,
    /// Items stored for the first time.
    pub inserted: usize,
    /// Items already stored; the insert was a no-op.
    pub duplicates: usize,
    /// Items stamped with the poll time because their date was unreadable.
    pub undated: usize,
    /// The document was cut short by malformed XML.
    pub truncated: bool,
}

#[derive(Debug)]
pub struct FeedReport {
    pub feed_id: i64,
    pub feed_link: String,
    pub result: Result<FeedRefresh, PollError>,
}

/// Outcome of one tick across all subscriptions.
#[derive(Debug)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    /// One entry per feed, in completion order.
    pub feeds: Vec<FeedReport>,
}

impl TickReport {
    pub fn succeeded(&self) -> usize {
        self.feeds.iter().filter(|f| f.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.feeds.len() - self.succeeded()
    }

    /// New items stored across all feeds.
    pub fn inserted(&self) -> usize {
        self.feeds
            .iter()
            .filter_map(|f| f.result.as_ref().ok())
            .map(|r| r.inserted)
            .sum()
    }
}

#[derive(Debug)]
pub enum PollOutcome {
    Completed(TickReport),
    /// Another poll was still running.
    Skipped,
}

/// Fetches subscribed feeds and hands their items to the store.
///
/// At most one poll runs at a time: [`poll_all`](Self::poll_all) skips if
/// another poll holds the gate, [`refresh_feed`](Self::refresh_feed) waits
/// for it.
pub struct Poller<S> {
    store: S,
    fetcher: Fetcher,
    clock: Arc<dyn Clock>,
    concurrency: usize,
    gate: Mutex<()>,
}

impl<S: FeedStore> Poller<S> {
    /// `concurrency` bounds the feeds fetched at once within a tick.
    pub fn new(store: S, fetcher: Fetcher, concurrency: usize) -> Self {
        Self {
            store,
            fetcher,
            clock: Arc::new(SystemClock),
            concurrency: concurrency.max(1),
            gate: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Polls every subscription once.
    ///
    /// A failing feed is reported in the [`TickReport`] and never stops the
    /// others. Feeds are fetched concurrently; the items of each feed are
    /// inserted one at a time in document order.
    ///
    /// # Errors
    ///
    /// Only when the subscription list itself cannot be read.
    pub async fn poll_all(&self) -> Result<PollOutcome, StoreError> {
        let Ok(_guard) = self.gate.try_lock() else {
            tracing::info!("Previous poll still running, skipping tick");
            return Ok(PollOutcome::Skipped);
        };

        let started_at = self.clock.now();
        let feeds = self.store.list_feeds().await.inspect_err(|e| {
            tracing::error!(error = %e, "Failed to list subscriptions");
        })?;

        let reports: Vec<FeedReport> = stream::iter(feeds)
            .map(|feed| async move {
                let result = self.refresh_subscription(&feed).await;
                FeedReport {
                    feed_id: feed.id,
                    feed_link: feed.feed_link,
                    result,
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let report = TickReport {
            started_at,
            feeds: reports,
        };
        tracing::info!(
            feeds = report.feeds.len(),
            failed = report.failed(),
            inserted = report.inserted(),
            "Poll finished"
        );
        Ok(PollOutcome::Completed(report))
    }

    /// Refreshes a single subscription now, waiting for a running poll to
    /// finish first.
    pub async fn refresh_feed(&self, feed_id: i64) -> Result<FeedRefresh, PollError> {
        let _guard = self.gate.lock().await;
        let feed = self
            .store
            .get_feed(feed_id)
            .await?
            .ok_or(PollError::UnknownFeed(feed_id))?;
        self.refresh_subscription(&feed).await
    }

    /// Fetches and parses `url` without touching the store, e.g. to preview
    /// a feed before subscribing.
    pub async fn fetch_and_parse(&self, url: &str) -> Result<Feed, PollError> {
        let bytes = self.fetcher.fetch(url).await?;
        Ok(parse_feed_at(&bytes, self.clock.now())?)
    }

    async fn refresh_subscription(&self, feed: &Subscription) -> Result<FeedRefresh, PollError> {
        let result = self.ingest(feed).await;

        let (format, error) = match &result {
            Ok(refresh) => (Some(refresh.format), None),
            Err(e) => {
                tracing::warn!(feed_id = feed.id, url = %feed.feed_link, error = %e, "Feed refresh failed");
                (None, Some(e.to_string()))
            }
        };
        if let Err(e) = self
            .store
            .record_poll(feed.id, format, error.as_deref(), self.clock.now())
            .await
        {
            tracing::warn!(feed_id = feed.id, error = %e, "Failed to record poll result");
        }

        result
    }

    async fn ingest(&self, feed: &Subscription) -> Result<FeedRefresh, PollError> {
        let parsed = self.fetch_and_parse(&feed.feed_link).await?;
        if parsed.undated_items > 0 {
            tracing::warn!(
                feed_id = feed.id,
                undated = parsed.undated_items,
                "Items without a readable date were stamped with the poll time"
            );
        }

        let mut refresh = FeedRefresh {
            format: parsed.format,
            inserted: 0,
            duplicates: 0,
            undated: parsed.undated_items,
            truncated: parsed.truncated,
        };
        for item in &parsed.items {
            if self.store.insert_item(feed.id, item).await? {
                refresh.inserted += 1;
            } else {
                refresh.duplicates += 1;
            }
        }

        tracing::debug!(
            feed_id = feed.id,
            inserted = refresh.inserted,
            duplicates = refresh.duplicates,
            "Feed refreshed"
        );
        Ok(refresh)
    }
}
