//! Feed acquisition: from URL to stored posts.
//!
//! One pass over a feed runs through three submodules in order:
//!
//! - [`fetcher`] - HTTP retrieval of the raw feed body
//! - [`parser`] - XML tree building and validation into a [`FeedDocument`]
//! - [`ingest`] - date parsing and idempotent insertion of posts
//!
//! [`xml`] holds the generic tree the parser validates against.
//!
//! # Example
//!
//! ```ignore
//! use gator::feed::{ingest, parse_feed, FetchClient};
//!
//! let body = FetchClient::new(None)?.fetch(&feed.url).await?;
//! let parsed = parse_feed(&body)?;
//! let report = ingest(&db, feed.id, &parsed.document).await?;
//! ```

mod fetcher;
mod ingest;
mod parser;
mod xml;

pub use fetcher::{FetchClient, FetchError, ACCEPT_RSS, USER_AGENT};
pub use ingest::{ingest, parse_pub_date, DateParseError, IngestReport};
pub use parser::{
    parse_feed, validate_item, FeedDocument, FeedItem, ItemDefect, ParseError, ParseResult,
};
pub use xml::{parse_tree, Field, XmlError, XmlNode, XmlValue, MAX_XML_DEPTH};
