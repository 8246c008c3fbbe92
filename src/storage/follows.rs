use super::schema::Database;
use super::types::{now_micros, DatabaseError, FeedFollowListing, FeedFollowRow};

const FOLLOW_SELECT: &str = r#"
    SELECT ff.id, ff.user_id, ff.feed_id, u.name AS user_name,
           f.name AS feed_name, f.url AS feed_url, ff.created_at
    FROM feed_follows ff
    INNER JOIN feeds f ON ff.feed_id = f.id
    INNER JOIN users u ON ff.user_id = u.id
"#;

impl Database {
    // ========================================================================
    // Follow Operations
    // ========================================================================

    /// Follow a feed and return the follow joined with user and feed names.
    ///
    /// Insert and read-back share one transaction. Following the same feed
    /// twice is a unique violation.
    pub async fn create_feed_follow(
        &self,
        user_id: i64,
        feed_id: i64,
    ) -> Result<FeedFollowListing, DatabaseError> {
        let now = now_micros();
        let mut tx = self.pool.begin().await?;

        let (follow_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feed_follows (user_id, feed_id, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(user_id)
        .bind(feed_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, FeedFollowRow>(&format!("{FOLLOW_SELECT} WHERE ff.id = ?"))
            .bind(follow_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into_listing())
    }

    /// Feeds followed by a user, ordered by feed name
    pub async fn get_feed_follows_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<FeedFollowListing>, DatabaseError> {
        let rows = sqlx::query_as::<_, FeedFollowRow>(&format!(
            "{FOLLOW_SELECT} WHERE ff.user_id = ? ORDER BY f.name, f.id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FeedFollowRow::into_listing).collect())
    }

    /// Unfollow by feed URL. Returns whether a follow was removed.
    pub async fn delete_feed_follow(
        &self,
        user_id: i64,
        feed_url: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            DELETE FROM feed_follows
            WHERE user_id = ?
              AND feed_id = (SELECT id FROM feeds WHERE url = ?)
        "#,
        )
        .bind(user_id)
        .bind(feed_url)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
