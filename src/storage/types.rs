use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Any query or connection failure
    #[error("Database error: {0}")]
    Query(#[from] sqlx::Error),
}

impl DatabaseError {
    /// True when the failure is a UNIQUE constraint violation
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DatabaseError::Query(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}

// ============================================================================
// Timestamp Helpers
// ============================================================================

// All `*_at` columns hold unix microseconds. Microsecond resolution keeps
// `select_feed_with_oldest_fetch` a total order when polls run back to back.

pub(crate) fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

pub(crate) fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}

pub(crate) fn now_micros() -> i64 {
    to_micros(Utc::now())
}

// ============================================================================
// Helper Types
// ============================================================================

/// Post fields produced by ingestion, before the store assigns an id
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl UserRow {
    pub(crate) fn into_user(self) -> User {
        User {
            id: self.id,
            name: self.name,
            created_at: from_micros(self.created_at),
            updated_at: from_micros(self.updated_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedRow {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub last_fetched_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl FeedRow {
    pub(crate) fn into_feed(self) -> Feed {
        Feed {
            id: self.id,
            name: self.name,
            url: self.url,
            user_id: self.user_id,
            last_fetched_at: self.last_fetched_at.map(from_micros),
            created_at: from_micros(self.created_at),
            updated_at: from_micros(self.updated_at),
        }
    }
}

/// Feed row joined with the name of the user who added it
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedListingRow {
    #[sqlx(flatten)]
    pub feed: FeedRow,
    pub user_name: Option<String>,
}

impl FeedListingRow {
    pub(crate) fn into_listing(self) -> FeedListing {
        FeedListing {
            feed: self.feed.into_feed(),
            user_name: self.user_name,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedFollowRow {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub user_name: String,
    pub feed_name: String,
    pub feed_url: String,
    pub created_at: i64,
}

impl FeedFollowRow {
    pub(crate) fn into_listing(self) -> FeedFollowListing {
        FeedFollowListing {
            id: self.id,
            user_id: self.user_id,
            feed_id: self.feed_id,
            user_name: self.user_name,
            feed_name: self.feed_name,
            feed_url: self.feed_url,
            created_at: from_micros(self.created_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostRow {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PostRow {
    pub(crate) fn into_post(self) -> Post {
        Post {
            id: self.id,
            feed_id: self.feed_id,
            title: self.title,
            url: self.url,
            description: self.description,
            published_at: from_micros(self.published_at),
            created_at: from_micros(self.created_at),
            updated_at: from_micros(self.updated_at),
        }
    }
}

/// Post row joined with its feed name (used by browse queries)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostListingRow {
    #[sqlx(flatten)]
    pub post: PostRow,
    pub feed_name: String,
}

impl PostListingRow {
    pub(crate) fn into_listing(self) -> PostListing {
        PostListing {
            post: self.post.into_post(),
            feed_name: self.feed_name,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A subscribed feed and its polling cursor.
///
/// `last_fetched_at` is `None` until the scheduler first picks the feed up;
/// it is stamped when a poll begins, not when it succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedListing {
    pub feed: Feed,
    /// `None` only if the owning user row vanished mid-query
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedFollowListing {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub user_name: String,
    pub feed_name: String,
    pub feed_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostListing {
    pub post: Post,
    pub feed_name: String,
}
