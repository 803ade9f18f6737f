use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{StoreError, Subscription, SubscriptionRow};
use crate::feed::SourceFormat;

const SUBSCRIPTION_COLUMNS: &str =
    "id, format, title, home_link, feed_link, created_at, last_polled, last_error";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// All subscriptions ordered by id (subscription order).
    pub async fn list_feeds(&self) -> Result<Vec<Subscription>, StoreError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM feeds ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SubscriptionRow::into_subscription).collect())
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Subscription>, StoreError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM feeds WHERE id = ?"
        ))
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SubscriptionRow::into_subscription))
    }

    /// Creates a subscription, or updates the existing one with the same
    /// `feed_link`, and returns its id.
    ///
    /// A blank `title` never overwrites a stored one.
    pub async fn create_feed(
        &self,
        format: SourceFormat,
        title: &str,
        home_link: &str,
        feed_link: &str,
    ) -> Result<i64, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feeds (format, title, home_link, feed_link, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(feed_link) DO UPDATE SET
                format = excluded.format,
                title = CASE WHEN excluded.title = '' THEN feeds.title ELSE excluded.title END,
                home_link = CASE WHEN excluded.home_link = '' THEN feeds.home_link ELSE excluded.home_link END
            RETURNING id
        "#,
        )
        .bind(format.as_str())
        .bind(title)
        .bind(home_link)
        .bind(feed_link)
        .bind(Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Records the outcome of a poll.
    ///
    /// `error` of `None` clears the previous error. `format` updates the
    /// stored format when the document was recognised.
    pub async fn record_poll(
        &self,
        feed_id: i64,
        format: Option<SourceFormat>,
        error: Option<&str>,
        polled_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE feeds SET
                last_polled = ?,
                last_error = ?,
                format = COALESCE(?, format)
            WHERE id = ?
        "#,
        )
        .bind(polled_at.timestamp())
        .bind(error)
        .bind(format.map(SourceFormat::as_str))
        .bind(feed_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Deletes a subscription and, through the cascade, its items.
    ///
    /// Returns `false` if no such feed existed.
    pub async fn delete_feed(&self, feed_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
