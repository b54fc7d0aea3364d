//! Tag-scoped feed extraction.
//!
//! This is deliberately not an XML parser. Real-world feeds are frequently
//! malformed, so fields are located with per-tag patterns over the raw text:
//!
//! - a CDATA-wrapped occurrence `<tag ...><![CDATA[ ... ]]></tag>` is tried first
//! - then a plain occurrence `<tag ...> ... </tag>`
//! - otherwise the field is empty
//!
//! Matching is case-insensitive and non-greedy, and bodies may span lines.
use regex::Regex;
use std::sync::LazyLock;

use super::normalize::{clean, normalize_date};

/// One article extracted from a feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    pub title: String,
    /// Plain text after [`clean`]
    pub description: String,
    pub link: String,
    /// Opaque, trimmed publication date string
    pub published_at: String,
    /// Falls back to `link` when the feed gives no identifier
    pub guid: String,
    pub category: String,
}

/// Parsed representation of one source's markup for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feed {
    pub title: String,
    pub description: String,
    pub language: String,
    /// URL the markup was fetched from
    pub source_link: String,
    pub items: Vec<Item>,
}

/// Compiled CDATA and plain patterns for a single tag name.
struct TagPattern {
    cdata: Regex,
    plain: Regex,
}

impl TagPattern {
    fn new(tag: &str) -> Result<Self, regex::Error> {
        let tag = regex::escape(tag);
        Ok(Self {
            cdata: Regex::new(&format!(
                r"(?i)<{tag}[^>]*><!\[CDATA\[([\s\S]*?)\]\]></{tag}>"
            ))?,
            plain: Regex::new(&format!(r"(?i)<{tag}[^>]*>([\s\S]*?)</{tag}>"))?,
        })
    }

    /// First match, CDATA taking precedence over a plain occurrence anywhere.
    fn first(&self, content: &str) -> String {
        self.cdata
            .captures(content)
            .or_else(|| self.plain.captures(content))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }

    /// Every match: all CDATA matches in document order, then all plain
    /// matches in document order. A CDATA-wrapped block therefore also
    /// appears a second time through the plain pass.
    fn all(&self, content: &str) -> Vec<String> {
        self.cdata
            .captures_iter(content)
            .chain(self.plain.captures_iter(content))
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }
}

/// Patterns for every tag the extractor reads, compiled once.
struct FeedPatterns {
    title: TagPattern,
    description: TagPattern,
    language: TagPattern,
    item: TagPattern,
    link: TagPattern,
    pub_date: TagPattern,
    guid: TagPattern,
    category: TagPattern,
}

impl FeedPatterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            title: TagPattern::new("title")?,
            description: TagPattern::new("description")?,
            language: TagPattern::new("language")?,
            item: TagPattern::new("item")?,
            link: TagPattern::new("link")?,
            pub_date: TagPattern::new("pubDate")?,
            guid: TagPattern::new("guid")?,
            category: TagPattern::new("category")?,
        })
    }
}

static PATTERNS: LazyLock<Result<FeedPatterns, regex::Error>> =
    LazyLock::new(FeedPatterns::compile);

/// Inner text of the first `tag` element, CDATA-wrapped occurrences first.
///
/// Returns an empty string when the tag does not occur.
pub fn extract_text(content: &str, tag: &str) -> Result<String, regex::Error> {
    Ok(TagPattern::new(tag)?.first(content))
}

/// Inner text of every `tag` element: CDATA matches first, then plain ones.
pub fn extract_all_text(content: &str, tag: &str) -> Result<Vec<String>, regex::Error> {
    Ok(TagPattern::new(tag)?.all(content))
}

/// Cheap sniff for RSS, Atom or bare channel markup.
pub fn looks_like_feed(content: &str) -> bool {
    content.contains("<rss") || content.contains("<feed") || content.contains("<channel")
}

/// Extracts channel metadata and items from raw feed markup.
///
/// Never fails: if the extraction patterns are unusable the error is logged
/// and an empty [`Feed`] carrying only `source_url` is returned.
///
/// Items whose title or description is empty after cleaning are dropped.
pub fn extract(markup: &str, source_url: &str) -> Feed {
    tracing::debug!(source = %source_url, bytes = markup.len(), "Extracting feed");

    let patterns = match PATTERNS.as_ref() {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(source = %source_url, error = %e, "Feed extraction patterns unavailable");
            return Feed {
                source_link: source_url.to_string(),
                ..Default::default()
            };
        }
    };

    let blocks = patterns.item.all(markup);
    let found = blocks.len();
    let items: Vec<Item> = blocks
        .iter()
        .filter_map(|block| extract_item(patterns, block))
        .collect();

    tracing::debug!(
        source = %source_url,
        found = found,
        kept = items.len(),
        "Extracted feed items"
    );

    Feed {
        title: patterns.title.first(markup),
        description: patterns.description.first(markup),
        language: patterns.language.first(markup),
        source_link: source_url.to_string(),
        items,
    }
}

fn extract_item(patterns: &FeedPatterns, block: &str) -> Option<Item> {
    let title = clean(&patterns.title.first(block));
    let description = clean(&patterns.description.first(block));
    if title.is_empty() || description.is_empty() {
        return None;
    }

    let link = patterns.link.first(block);
    let mut guid = patterns.guid.first(block);
    if guid.is_empty() && !link.is_empty() {
        guid = link.clone();
    }

    Some(Item {
        title,
        description,
        published_at: normalize_date(&patterns.pub_date.first(block)).to_string(),
        guid,
        category: patterns.category.first(block),
        link,
    })
}
