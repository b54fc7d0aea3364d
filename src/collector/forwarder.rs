use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::Source;
use crate::feed::{Fetcher, Item};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Sink wire format for one article.
#[derive(Debug, Serialize)]
pub struct ArticlePayload<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub source: &'a str,
    pub category: &'a str,
    pub url: &'a str,
    pub published_at: &'a str,
}

impl<'a> ArticlePayload<'a> {
    /// Category comes from the source, not the item.
    pub fn new(source: &'a Source, item: &'a Item) -> Self {
        Self {
            title: &item.title,
            content: &item.description,
            source: &source.name,
            category: &source.category,
            url: &item.link,
            published_at: &item.published_at,
        }
    }
}

/// Posts normalized items to the sink.
///
/// Delivery is at-most-once: failures are logged and reported to the caller,
/// never retried.
pub struct Forwarder {
    fetcher: Arc<Fetcher>,
    sink_url: String,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(fetcher: Arc<Fetcher>, sink_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            fetcher,
            sink_url: sink_url.into(),
            timeout,
        }
    }

    pub fn sink_url(&self) -> &str {
        &self.sink_url
    }

    /// Returns true if the sink answered 2xx.
    pub async fn forward(&self, source: &Source, item: &Item) -> bool {
        let body = match serde_json::to_string(&ArticlePayload::new(source, item)) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(title = %item.title, error = %e, "Failed to serialize item");
                return false;
            }
        };

        tracing::debug!(source = %source.name, title = %item.title, "Forwarding item to sink");
        let response = self
            .fetcher
            .post(&self.sink_url, body, JSON_CONTENT_TYPE, self.timeout)
            .await;

        if response.succeeded {
            tracing::debug!(
                title = %item.title,
                status = response.status_code,
                "Item accepted by sink"
            );
        } else {
            tracing::warn!(
                source = %source.name,
                title = %item.title,
                status = response.status_code,
                body = %response.body,
                "Sink rejected item"
            );
        }
        response.succeeded
    }
}
