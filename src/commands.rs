//! Operations behind the `gator` subcommands.
//!
//! Each operation works on a [`Database`] and returns plain data; the
//! `write_*` functions render that data for the terminal. Feed-supplied text
//! is passed through [`strip_control_chars`] before it is written.

use anyhow::{bail, Context, Result};
use std::io::Write;

use crate::storage::{Database, Feed, FeedFollowListing, FeedListing, PostListing, User};
use crate::util::{strip_control_chars, validate_feed_url};

/// Create a user, refusing a name that is already taken.
pub async fn register(db: &Database, name: &str) -> Result<User> {
    let name = name.trim();
    if name.is_empty() {
        bail!("user name must not be empty");
    }

    match db.create_user(name).await {
        Ok(user) => Ok(user),
        Err(e) if e.is_unique_violation() => bail!("user {name} already exists"),
        Err(e) => Err(e).context("Failed to create user"),
    }
}

/// Resolve the acting user from `--user` or the configured current user.
pub async fn require_user(db: &Database, name: Option<&str>) -> Result<User> {
    let Some(name) = name else {
        bail!("no current user; run `gator login <name>` or pass --user");
    };

    db.get_user_by_name(name)
        .await
        .context("Failed to look up user")?
        .with_context(|| format!("user {name} not found"))
}

/// Create a feed owned by `user` and follow it.
pub async fn add_feed(
    db: &Database,
    user: &User,
    name: &str,
    url: &str,
) -> Result<(Feed, FeedFollowListing)> {
    let url = validate_feed_url(url).with_context(|| format!("Rejected feed URL {url}"))?;

    let feed = match db.create_feed(name, url.as_str(), user.id).await {
        Ok(feed) => feed,
        Err(e) if e.is_unique_violation() => bail!("feed {url} already exists"),
        Err(e) => return Err(e).context("Failed to create feed"),
    };
    let follow = db
        .create_feed_follow(user.id, feed.id)
        .await
        .context("Failed to follow new feed")?;

    tracing::info!(feed_id = feed.id, url = %feed.url, "Feed added");
    Ok((feed, follow))
}

/// Follow an existing feed by URL.
pub async fn follow(db: &Database, user: &User, url: &str) -> Result<FeedFollowListing> {
    let feed = db
        .get_feed_by_url(url)
        .await
        .context("Failed to look up feed")?
        .with_context(|| format!("feed {url} not found"))?;

    match db.create_feed_follow(user.id, feed.id).await {
        Ok(follow) => Ok(follow),
        Err(e) if e.is_unique_violation() => bail!("{} already follows {url}", user.name),
        Err(e) => Err(e).context("Failed to follow feed"),
    }
}

pub async fn unfollow(db: &Database, user: &User, url: &str) -> Result<()> {
    let removed = db
        .delete_feed_follow(user.id, url)
        .await
        .context("Failed to unfollow feed")?;
    if !removed {
        bail!("{} does not follow {url}", user.name);
    }
    Ok(())
}

// ============================================================================
// Rendering
// ============================================================================

pub fn write_users(out: &mut impl Write, users: &[User], current: Option<&str>) -> Result<()> {
    for user in users {
        if Some(user.name.as_str()) == current {
            writeln!(out, "* {} (current)", user.name)?;
        } else {
            writeln!(out, "* {}", user.name)?;
        }
    }
    Ok(())
}

pub fn write_feeds(out: &mut impl Write, feeds: &[FeedListing]) -> Result<()> {
    for listing in feeds {
        writeln!(out, "* {}", strip_control_chars(&listing.feed.name))?;
        writeln!(out, "  URL:     {}", listing.feed.url)?;
        writeln!(
            out,
            "  Added by: {}",
            listing.user_name.as_deref().unwrap_or("(deleted user)")
        )?;
    }
    Ok(())
}

pub fn write_follow(out: &mut impl Write, follow: &FeedFollowListing) -> Result<()> {
    writeln!(
        out,
        "{} now follows {}",
        follow.user_name,
        strip_control_chars(&follow.feed_name)
    )?;
    Ok(())
}

pub fn write_following(out: &mut impl Write, follows: &[FeedFollowListing]) -> Result<()> {
    if follows.is_empty() {
        writeln!(out, "Not following any feeds")?;
    }
    for follow in follows {
        writeln!(out, "* {}", strip_control_chars(&follow.feed_name))?;
    }
    Ok(())
}

pub fn write_posts(out: &mut impl Write, posts: &[PostListing]) -> Result<()> {
    if posts.is_empty() {
        writeln!(out, "No posts yet")?;
    }
    for listing in posts {
        let post = &listing.post;
        writeln!(out, "{}", strip_control_chars(&post.title))?;
        writeln!(
            out,
            "  {} | {}",
            strip_control_chars(&listing.feed_name),
            post.published_at.format("%a, %d %b %Y %H:%M UTC")
        )?;
        writeln!(out, "  {}", strip_control_chars(&post.url))?;
        if let Some(description) = &post.description {
            writeln!(out, "  {}", strip_control_chars(description))?;
        }
        writeln!(out)?;
    }
    Ok(())
}
