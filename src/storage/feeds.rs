use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{
    now_micros, to_micros, DatabaseError, Feed, FeedListing, FeedListingRow, FeedRow,
};

const FEED_COLUMNS: &str = "id, name, url, user_id, last_fetched_at, created_at, updated_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a feed owned by `user_id`. URLs are unique across all users.
    pub async fn create_feed(
        &self,
        name: &str,
        url: &str,
        user_id: i64,
    ) -> Result<Feed, DatabaseError> {
        let now = now_micros();
        let row = sqlx::query_as::<_, FeedRow>(&format!(
            r#"
            INSERT INTO feeds (name, url, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_feed())
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        let row = sqlx::query_as::<_, FeedRow>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedRow::into_feed))
    }

    /// All feeds with the name of the user who added each, ordered by feed name
    pub async fn get_feeds(&self) -> Result<Vec<FeedListing>, DatabaseError> {
        let rows = sqlx::query_as::<_, FeedListingRow>(
            r#"
            SELECT f.id, f.name, f.url, f.user_id, f.last_fetched_at,
                   f.created_at, f.updated_at, u.name AS user_name
            FROM feeds f
            LEFT JOIN users u ON f.user_id = u.id
            ORDER BY f.name, f.id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FeedListingRow::into_listing).collect())
    }

    // ========================================================================
    // Scheduler Operations
    // ========================================================================

    /// The feed that should be polled next.
    ///
    /// Never-fetched feeds come first, then the oldest `last_fetched_at`.
    /// Ties are broken by id so the order is total.
    pub async fn select_feed_with_oldest_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        let row = sqlx::query_as::<_, FeedRow>(&format!(
            r#"
            SELECT {FEED_COLUMNS}
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
            LIMIT 1
        "#
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedRow::into_feed))
    }

    /// Stamp `last_fetched_at` and `updated_at` with the current time
    pub async fn mark_feed_fetched(&self, feed_id: i64) -> Result<(), DatabaseError> {
        self.mark_feed_fetched_at(feed_id, Utc::now()).await
    }

    /// Stamp `last_fetched_at` and `updated_at` with an explicit instant
    pub async fn mark_feed_fetched_at(
        &self,
        feed_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let at = to_micros(at);
        sqlx::query("UPDATE feeds SET last_fetched_at = ?, updated_at = ? WHERE id = ?")
            .bind(at)
            .bind(at)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
