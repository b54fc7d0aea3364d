use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::redirect::Policy;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Scheme prefix that routes a fetch to the local filesystem.
pub const FILE_SCHEME: &str = "file://";

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Transport-level failures inside the fetcher.
///
/// These never cross the public boundary: [`Fetcher::fetch`] and
/// [`Fetcher::post`] fold them into a [`FetchResult`] via [`FetchError::status_code`].
#[derive(Debug, Error)]
enum FetchError {
    /// Network-level error (DNS, connection, TLS, redirect limit, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the caller's timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the size limit; the server did answer with `status`
    #[error("Response too large (status {status})")]
    ResponseTooLarge { status: u16 },
    /// Local file could not be opened
    #[error("File not found: {0}")]
    NotFound(String),
    /// Local file was opened but could not be read
    #[error("File read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Best-effort status code: 0 when the transport itself failed.
    fn status_code(&self) -> u16 {
        match self {
            FetchError::Network(e) => e.status().map(|s| s.as_u16()).unwrap_or(0),
            FetchError::Timeout => 0,
            FetchError::ResponseTooLarge { status } => *status,
            FetchError::NotFound(_) => 404,
            FetchError::Io(_) => 500,
        }
    }
}

/// Outcome of a single fetch or post.
///
/// `succeeded` is true iff a file read succeeded or the HTTP status is 2xx.
/// Header names are stored lowercased; use [`FetchResult::header`] for
/// case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    pub succeeded: bool,
    pub status_code: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
}

impl FetchResult {
    fn from_error(error: &FetchError) -> Self {
        Self {
            succeeded: false,
            status_code: error.status_code(),
            ..Default::default()
        }
    }

    /// Look up a response header by name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Construction options for [`Fetcher`].
#[derive(Debug, Clone)]
pub struct FetcherOptions {
    /// Sent as `User-Agent` on every network request.
    pub user_agent: String,
    /// Upper bound on any single request when the caller's timeout is larger.
    pub default_timeout: Duration,
    /// Maximum number of redirects followed before the request fails.
    pub max_redirects: usize,
    /// Network bodies larger than this are rejected.
    pub max_body_size: usize,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            user_agent: "NewsAggregator/1.0 (RSS Reader)".to_string(),
            default_timeout: Duration::from_secs(30),
            max_redirects: 5,
            max_body_size: MAX_FEED_SIZE,
        }
    }
}

/// Retrieves raw feed markup over HTTP(S) or from `file://` paths.
///
/// Owns the process-wide connection pool. Create one at startup and share it
/// behind an `Arc`; dropping it releases the pool.
pub struct Fetcher {
    client: reqwest::Client,
    max_body_size: usize,
}

impl Fetcher {
    /// Builds the underlying HTTP client. TLS certificates are verified.
    pub fn new(options: FetcherOptions) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(options.user_agent)
            .redirect(Policy::limited(options.max_redirects))
            .timeout(options.default_timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            max_body_size: options.max_body_size,
        })
    }

    /// GET `url` (or read it from disk for `file://` URLs).
    pub async fn fetch(&self, url: &str, timeout: Duration) -> FetchResult {
        if let Some(path) = url.strip_prefix(FILE_SCHEME) {
            return read_file(path, timeout).await;
        }

        tracing::info!(method = "GET", url = %url, "Sending request");
        let outcome = tokio::time::timeout(timeout, self.send(self.client.get(url))).await;
        finish("GET", url, outcome)
    }

    /// POST `body` to `url` with the given content type.
    pub async fn post(
        &self,
        url: &str,
        body: String,
        content_type: &str,
        timeout: Duration,
    ) -> FetchResult {
        tracing::info!(method = "POST", url = %url, bytes = body.len(), "Sending request");
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(body);
        let outcome = tokio::time::timeout(timeout, self.send(request)).await;
        finish("POST", url, outcome)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<FetchResult, FetchError> {
        let response = request.send().await?;
        let status = response.status();
        let headers = collect_headers(response.headers());
        let bytes = read_limited_bytes(response, self.max_body_size).await?;

        Ok(FetchResult {
            succeeded: status.is_success(),
            status_code: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
            headers,
        })
    }
}

fn finish(
    method: &str,
    url: &str,
    outcome: Result<Result<FetchResult, FetchError>, tokio::time::error::Elapsed>,
) -> FetchResult {
    match outcome.map_err(|_| FetchError::Timeout).and_then(|r| r) {
        Ok(result) => {
            tracing::info!(
                method = method,
                url = %url,
                status = result.status_code,
                bytes = result.body.len(),
                "Request completed"
            );
            result
        }
        Err(e) => {
            tracing::error!(method = method, url = %url, error = %e, "Request failed");
            FetchResult::from_error(&e)
        }
    }
}

/// Header names are already lowercase in `HeaderMap`; repeated headers keep
/// the last value. Non-UTF-8 values are skipped.
fn collect_headers(map: &HeaderMap) -> HashMap<String, String> {
    map.iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.trim().to_string()))
        })
        .collect()
}

async fn read_limited_bytes(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, FetchError> {
    let status = response.status().as_u16();

    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge { status });
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge { status });
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

async fn read_file(path: &str, timeout: Duration) -> FetchResult {
    tracing::info!(path = %path, "Reading file");

    let outcome = match tokio::time::timeout(timeout, tokio::fs::read(path)).await {
        Err(_) => Err(FetchError::Timeout),
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                Err(FetchError::NotFound(path.to_string()))
            }
            _ => Err(FetchError::Io(e)),
        },
    };

    match outcome {
        Ok(bytes) => {
            tracing::info!(path = %path, bytes = bytes.len(), "File read completed");
            FetchResult {
                succeeded: true,
                status_code: 200,
                body: String::from_utf8_lossy(&bytes).into_owned(),
                headers: HashMap::new(),
            }
        }
        Err(e) => {
            tracing::error!(path = %path, error = %e, "File read failed");
            FetchResult::from_error(&e)
        }
    }
}
