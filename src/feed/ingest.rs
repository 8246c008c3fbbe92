use chrono::{DateTime, Utc};
use thiserror::Error;

use super::parser::FeedDocument;
use crate::storage::{Database, DatabaseError, NewPost, Post};

/// An item's `<pubDate>` is not a date we understand.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized publish date: {0:?}")]
pub struct DateParseError(pub String);

/// Outcome of ingesting one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Newly stored posts in document order
    pub posts: Vec<Post>,
    /// Items whose (feed, link) pair was already stored
    pub duplicates: usize,
    /// Items skipped because their publish date did not parse
    pub undated: usize,
}

/// Parse an RSS publish date.
///
/// RFC 2822 is what RSS 2.0 mandates; RFC 3339 covers the feeds that emit
/// ISO timestamps instead.
pub fn parse_pub_date(raw: &str) -> Result<DateTime<Utc>, DateParseError> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DateParseError(raw.to_owned()))
}

/// Persist every item of `document` as a post of `feed_id`.
///
/// Items are inserted in document order. An item with an unparsable date is
/// skipped on its own; an item already stored for this feed is skipped as a
/// duplicate. A storage failure stops the batch.
pub async fn ingest(
    db: &Database,
    feed_id: i64,
    document: &FeedDocument,
) -> Result<IngestReport, DatabaseError> {
    let mut report = IngestReport::default();

    for item in &document.items {
        let published_at = match parse_pub_date(&item.pub_date) {
            Ok(at) => at,
            Err(e) => {
                tracing::warn!(feed_id, link = %item.link, error = %e, "Skipping item with bad publish date");
                report.undated += 1;
                continue;
            }
        };

        let new_post = NewPost {
            feed_id,
            title: item.title.clone(),
            url: item.link.clone(),
            description: item.description.clone(),
            published_at,
        };

        match db.insert_post(&new_post).await? {
            Some(post) => {
                tracing::info!(feed_id, title = %post.title, "Found post");
                report.posts.push(post);
            }
            None => report.duplicates += 1,
        }
    }

    Ok(report)
}
