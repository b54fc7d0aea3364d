use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme the collector cannot fetch.
    #[error("Unsupported scheme: {0} (only http/https/file allowed)")]
    UnsupportedScheme(String),
    /// A network URL without a host.
    #[error("URL has no host")]
    MissingHost,
    /// A `file://` URL without a path.
    #[error("File URL has no path")]
    MissingPath,
}

/// Validates a URL string for use as a feed source.
///
/// Accepts `http`, `https`, and `file` schemes. Network URLs must name a
/// host; file URLs must name a path.
///
/// # Examples
///
/// ```
/// use feed_collector::util::validate_source_url;
///
/// assert!(validate_source_url("https://example.com/feed.xml").is_ok());
/// assert!(validate_source_url("file:///var/feeds/local.xml").is_ok());
/// assert!(validate_source_url("ftp://example.com/feed").is_err());
/// ```
pub fn validate_source_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => require_host(url),
        "file" => {
            if url.path().is_empty() || url.path() == "/" {
                return Err(UrlValidationError::MissingPath);
            }
            Ok(url)
        }
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

/// Validates the sink URL. Only `http` and `https` are allowed.
pub fn validate_sink_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => require_host(url),
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

fn require_host(url: Url) -> Result<Url, UrlValidationError> {
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(UrlValidationError::MissingHost),
    }
}
