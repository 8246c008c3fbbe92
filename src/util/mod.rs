//! Small helpers shared by the CLI and the aggregator.
//!
//! - **Intervals**: parsing the `agg` argument into a [`PollInterval`]
//! - **URL validation**: checking feed URLs before they are stored
//! - **Text**: stripping terminal control sequences from feed-supplied text

mod interval;
mod text;
mod url_validator;

pub use interval::{InvalidDuration, PollInterval};
pub use text::strip_control_chars;
pub use url_validator::{validate_feed_url, UrlValidationError};
