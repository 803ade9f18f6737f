use chrono::Utc;

use super::schema::Database;
use super::types::{StoreError, StoredItem, StoredItemRow};
use crate::feed::FeedItem;

const ITEM_COLUMNS: &str =
    "id, feed_id, external_id, title, content, link, published_at, fetched_at";

impl Database {
    // ========================================================================
    // Item Operations
    // ========================================================================

    /// Inserts an item keyed by `(feed_id, external_id)`.
    ///
    /// Returns `false` when the key already exists; the stored row is left
    /// untouched. The uniqueness constraint makes this atomic, so concurrent
    /// pollers cannot create duplicates.
    pub async fn insert_item(&self, feed_id: i64, item: &FeedItem) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO items
                (feed_id, external_id, title, content, link, published_at, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(feed_id)
        .bind(&item.external_id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(&item.link)
        .bind(item.published_at.timestamp())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Newest items across all feeds, by publication time.
    pub async fn recent_items(&self, limit: u32) -> Result<Vec<StoredItem>, StoreError> {
        let rows: Vec<StoredItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM items ORDER BY published_at DESC, id DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(StoredItemRow::into_item).collect())
    }

    /// Items of one feed in insertion order.
    pub async fn items_for_feed(&self, feed_id: i64) -> Result<Vec<StoredItem>, StoreError> {
        let rows: Vec<StoredItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE feed_id = ? ORDER BY id"
        ))
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(StoredItemRow::into_item).collect())
    }
}
