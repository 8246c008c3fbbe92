use super::schema::Database;
use super::types::{
    now_micros, to_micros, DatabaseError, NewPost, Post, PostListing, PostListingRow, PostRow,
};

// ============================================================================
// Query Limit Constants
// ============================================================================

/// Maximum number of posts returned by any single query, including
/// `get_posts_for_feed`, which takes no limit of its own
const MAX_POSTS: i64 = 2000;

const POST_COLUMNS: &str =
    "id, feed_id, title, url, description, published_at, created_at, updated_at";

impl Database {
    // ========================================================================
    // Post Mutations
    // ========================================================================

    /// Insert a post unless its (feed_id, url) pair is already stored.
    ///
    /// Returns `Ok(None)` when the post was already ingested; the existing row
    /// is left untouched.
    pub async fn insert_post(&self, post: &NewPost) -> Result<Option<Post>, DatabaseError> {
        let now = now_micros();
        let row = sqlx::query_as::<_, PostRow>(&format!(
            r#"
            INSERT INTO posts (feed_id, title, url, description, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(feed_id, url) DO NOTHING
            RETURNING {POST_COLUMNS}
        "#
        ))
        .bind(post.feed_id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(to_micros(post.published_at))
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PostRow::into_post))
    }

    // ========================================================================
    // Post Queries
    // ========================================================================

    /// Newest posts across every feed the user follows.
    ///
    /// Capped at `MAX_POSTS` regardless of `limit`.
    pub async fn get_posts_for_user(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<PostListing>, DatabaseError> {
        let limit = limit.clamp(0, MAX_POSTS);
        tracing::debug!(user_id, limit, "get_posts_for_user");

        let rows = sqlx::query_as::<_, PostListingRow>(
            r#"
            SELECT p.id, p.feed_id, p.title, p.url, p.description, p.published_at,
                   p.created_at, p.updated_at, f.name AS feed_name
            FROM posts p
            INNER JOIN feed_follows ff ON p.feed_id = ff.feed_id
            INNER JOIN feeds f ON p.feed_id = f.id
            WHERE ff.user_id = ?
            ORDER BY p.published_at DESC, p.id DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PostListingRow::into_listing).collect())
    }

    /// Posts of one feed in ingestion order, at most `MAX_POSTS` (2000) of
    /// them; later posts past the cap are not returned.
    pub async fn get_posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>, DatabaseError> {
        let rows = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE feed_id = ? ORDER BY id ASC LIMIT ?"
        ))
        .bind(feed_id)
        .bind(MAX_POSTS)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PostRow::into_post).collect())
    }
}
