use thiserror::Error;
use url::Url;

/// Reasons a string is refused as a feed URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("URL must not embed credentials")]
    Credentials,
}

/// Check a user-supplied feed URL before it is stored.
///
/// Accepts only `http` and `https` URLs that name a host. Credentials in the
/// URL are refused since every stored feed URL is printed by `feeds`.
///
/// ```
/// use gator::util::validate_feed_url;
///
/// let url = validate_feed_url("https://blog.boot.dev/index.xml").unwrap();
/// assert_eq!(url.host_str(), Some("blog.boot.dev"));
///
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlValidationError::MissingHost),
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(UrlValidationError::Credentials);
    }

    Ok(url)
}
