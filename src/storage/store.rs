use std::future::Future;

use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{StoreError, Subscription};
use crate::feed::{FeedItem, SourceFormat};

/// Persistence boundary of the ingestion core.
///
/// The store alone serialises concurrent writes. `insert_item` must be an
/// atomic insert-or-ignore on `(feed_id, external_id)`: a duplicate reports
/// `Ok(false)` and is never an error.
pub trait FeedStore: Send + Sync {
    fn list_feeds(&self) -> impl Future<Output = Result<Vec<Subscription>, StoreError>> + Send;

    fn get_feed(
        &self,
        feed_id: i64,
    ) -> impl Future<Output = Result<Option<Subscription>, StoreError>> + Send;

    /// Returns the id of the new or existing subscription for `feed_link`.
    fn create_feed(
        &self,
        format: SourceFormat,
        title: &str,
        home_link: &str,
        feed_link: &str,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    fn insert_item(
        &self,
        feed_id: i64,
        item: &FeedItem,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn record_poll(
        &self,
        feed_id: i64,
        format: Option<SourceFormat>,
        error: Option<&str>,
        polled_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl FeedStore for Database {
    fn list_feeds(&self) -> impl Future<Output = Result<Vec<Subscription>, StoreError>> + Send {
        Database::list_feeds(self)
    }

    fn get_feed(
        &self,
        feed_id: i64,
    ) -> impl Future<Output = Result<Option<Subscription>, StoreError>> + Send {
        Database::get_feed(self, feed_id)
    }

    fn create_feed(
        &self,
        format: SourceFormat,
        title: &str,
        home_link: &str,
        feed_link: &str,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send {
        Database::create_feed(self, format, title, home_link, feed_link)
    }

    fn insert_item(
        &self,
        feed_id: i64,
        item: &FeedItem,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send {
        Database::insert_item(self, feed_id, item)
    }

    fn record_poll(
        &self,
        feed_id: i64,
        format: Option<SourceFormat>,
        error: Option<&str>,
        polled_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        Database::record_poll(self, feed_id, format, error, polled_at)
    }
}
