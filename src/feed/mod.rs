//! Feed retrieval and extraction.
//!
//! - [`fetcher`] - HTTP(S) and `file://` retrieval that never fails across its boundary
//! - [`extractor`] - tag-scoped, CDATA-aware extraction of channel metadata and items
//! - [`normalize`] - plain-text cleaning, entity decoding, and date passthrough
//!
//! # Example
//!
//! ```ignore
//! use feed_collector::feed::{extract, Fetcher, FetcherOptions};
//!
//! let fetcher = Fetcher::new(FetcherOptions::default())?;
//! let response = fetcher.fetch("https://example.com/rss", Duration::from_secs(30)).await;
//! if response.succeeded {
//!     let feed = extract(&response.body, "https://example.com/rss");
//! }
//! ```

mod extractor;
mod fetcher;
mod normalize;

pub use extractor::{extract, extract_all_text, extract_text, looks_like_feed, Feed, Item};
pub use fetcher::{FetchResult, Fetcher, FetcherOptions, FILE_SCHEME};
pub use normalize::{clean, decode_entities, dedupe_key, normalize_date};
