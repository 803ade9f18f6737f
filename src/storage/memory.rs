use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::store::FeedStore;
use super::types::{StoreError, StoredItem, Subscription};
use crate::feed::{FeedItem, SourceFormat};

/// Volatile [`FeedStore`] for embedding and tests.
///
/// Uses the same natural keys as [`Database`](super::Database): one
/// subscription per feed link, one item per `(feed_id, external_id)`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    feeds: Vec<Subscription>,
    items: Vec<StoredItem>,
    keys: HashSet<(i64, String)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All items in insertion order.
    pub fn items(&self) -> Vec<StoredItem> {
        self.lock().items.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // State is only mutated by whole operations, so a poisoned lock is still consistent
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl FeedStore for MemoryStore {
    async fn list_feeds(&self) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.lock().feeds.clone())
    }

    async fn get_feed(&self, feed_id: i64) -> Result<Option<Subscription>, StoreError> {
        Ok(self.lock().feeds.iter().find(|f| f.id == feed_id).cloned())
    }

    async fn create_feed(
        &self,
        format: SourceFormat,
        title: &str,
        home_link: &str,
        feed_link: &str,
    ) -> Result<i64, StoreError> {
        let mut state = self.lock();
        if let Some(feed) = state.feeds.iter_mut().find(|f| f.feed_link == feed_link) {
            feed.format = format;
            if !title.is_empty() {
                feed.title = title.to_string();
            }
            if !home_link.is_empty() {
                feed.home_link = home_link.to_string();
            }
            return Ok(feed.id);
        }
        let id = state.feeds.len() as i64 + 1;
        state.feeds.push(Subscription {
            id,
            format,
            title: title.to_string(),
            home_link: home_link.to_string(),
            feed_link: feed_link.to_string(),
            created_at: Utc::now(),
            last_polled: None,
            last_error: None,
        });
        Ok(id)
    }

    async fn insert_item(&self, feed_id: i64, item: &FeedItem) -> Result<bool, StoreError> {
        let mut state = self.lock();
        if !state.keys.insert((feed_id, item.external_id.clone())) {
            return Ok(false);
        }
        let id = state.items.len() as i64 + 1;
        state.items.push(StoredItem {
            id,
            feed_id,
            external_id: item.external_id.clone(),
            title: item.title.clone(),
            content: item.description.clone(),
            link: item.link.clone(),
            published_at: item.published_at,
            fetched_at: Utc::now(),
        });
        Ok(true)
    }

    async fn record_poll(
        &self,
        feed_id: i64,
        format: Option<SourceFormat>,
        error: Option<&str>,
        polled_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        if let Some(feed) = state.feeds.iter_mut().find(|f| f.id == feed_id) {
            feed.last_polled = Some(polled_at);
            feed.last_error = error.map(str::to_string);
            if let Some(format) = format {
                feed.format = format;
            }
        }
        Ok(())
    }
}
