use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::feed::SourceFormat;

// ============================================================================
// Error Types
// ============================================================================

/// Store failures with user-facing messages
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process holds the database lock
    #[error("Another instance of feedmill appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StoreError {
    /// Maps lock-related sqlx errors to [`StoreError::InstanceLocked`].
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return StoreError::InstanceLocked;
        }
        StoreError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) messages
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SubscriptionRow {
    pub id: i64,
    pub format: String,
    pub title: String,
    pub home_link: String,
    pub feed_link: String,
    pub created_at: i64,
    pub last_polled: Option<i64>,
    pub last_error: Option<String>,
}

impl SubscriptionRow {
    pub(crate) fn into_subscription(self) -> Subscription {
        Subscription {
            id: self.id,
            // Rows are only written through SourceFormat::as_str
            format: SourceFormat::from_hint(&self.format).unwrap_or(SourceFormat::Rss),
            title: self.title,
            home_link: self.home_link,
            feed_link: self.feed_link,
            created_at: from_unix(self.created_at),
            last_polled: self.last_polled.map(from_unix),
            last_error: self.last_error,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct StoredItemRow {
    pub id: i64,
    pub feed_id: i64,
    pub external_id: String,
    pub title: String,
    pub content: String,
    pub link: String,
    pub published_at: i64,
    pub fetched_at: i64,
}

impl StoredItemRow {
    pub(crate) fn into_item(self) -> StoredItem {
        StoredItem {
            id: self.id,
            feed_id: self.feed_id,
            external_id: self.external_id,
            title: self.title,
            content: self.content,
            link: self.link,
            published_at: from_unix(self.published_at),
            fetched_at: from_unix(self.fetched_at),
        }
    }
}

/// Timestamps are stored as whole unix seconds.
pub(crate) fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

// ============================================================================
// Data Structures
// ============================================================================

/// A subscribed feed as recorded by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub id: i64,
    /// Format seen on the last successful poll, or the import hint
    pub format: SourceFormat,
    pub title: String,
    /// Site URL (may be empty)
    pub home_link: String,
    /// Feed document URL; unique per store
    pub feed_link: String,
    pub created_at: DateTime<Utc>,
    pub last_polled: Option<DateTime<Utc>>,
    /// Error from the most recent poll, cleared on success
    pub last_error: Option<String>,
}

/// An ingested item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredItem {
    pub id: i64,
    pub feed_id: i64,
    pub external_id: String,
    pub title: String,
    pub content: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}
