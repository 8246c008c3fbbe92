//! gator: a command-line RSS aggregator.
//!
//! Users register feeds and follow them; `gator agg` then polls the feed that
//! has waited longest on every tick and stores each new item as a post.

pub mod commands;
pub mod config;
pub mod feed;
pub mod scheduler;
pub mod storage;
pub mod util;
