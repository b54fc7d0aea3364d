//! Text normalization for extracted feed fields.
//!
//! Feeds routinely wrap descriptions in CDATA, embed HTML, and escape
//! punctuation as named entities. [`clean`] reduces all of that to a single
//! line of plain text.
use regex::Regex;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::sync::LazyLock;

use super::extractor::Item;

static CDATA_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!\[CDATA\[([\s\S]*?)\]\]>").unwrap());
static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static WHITESPACE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Entity table in the order it is applied. Each entry is replaced across the
/// whole text before the next one runs, so `&amp;` (applied early) exposes
/// double-escaped sequences such as `&amp;quot;` to the later entries.
const ENTITY_TABLE: [(&str, &str); 17] = [
    ("&#39;", "'"),
    ("&amp;", "&"),
    ("&apos;", "'"),
    ("&cent;", "\u{a2}"),
    ("&copy;", "\u{a9}"),
    ("&euro;", "\u{20ac}"),
    ("&gt;", ">"),
    ("&hellip;", "\u{2026}"),
    ("&lt;", "<"),
    ("&mdash;", "\u{2014}"),
    ("&nbsp;", " "),
    ("&ndash;", "\u{2013}"),
    ("&pound;", "\u{a3}"),
    ("&quot;", "\""),
    ("&reg;", "\u{ae}"),
    ("&trade;", "\u{2122}"),
    ("&yen;", "\u{a5}"),
];

/// Reduces an extracted field to plain text.
///
/// Steps, in order:
/// 1. If a CDATA section is present, keep only the first section's contents
/// 2. Remove every `<...>` tag
/// 3. Decode the fixed entity table (see [`decode_entities`])
/// 4. Collapse whitespace runs (including newlines) to one space
/// 5. Trim
///
/// Tags are stripped before entities are decoded, so `&lt;b&gt;` survives as
/// the literal text `<b>`.
///
/// # Examples
///
/// ```
/// use feed_collector::feed::clean;
///
/// assert_eq!(clean("<p>Hello &amp; <b>World</b></p>"), "Hello & World");
/// ```
pub fn clean(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let unwrapped = match CDATA_PATTERN.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => raw,
    };

    let stripped = TAG_PATTERN.replace_all(unwrapped, "");
    let decoded = decode_entities(&stripped);
    let collapsed = WHITESPACE_PATTERN.replace_all(&decoded, " ");

    collapsed.trim().to_string()
}

/// Decodes a fixed table of named HTML entities.
///
/// Supported: `&amp; &lt; &gt; &quot; &#39; &apos; &nbsp; &mdash; &ndash;
/// &hellip; &copy; &reg; &trade; &euro; &pound; &yen; &cent;`. Numeric
/// entities other than `&#39;` and unknown names are left untouched.
///
/// Entries are applied one after another in a fixed order, which
/// unwraps one level of double escaping: `&amp;lt;` becomes `<`, while
/// `&amp;#39;` stays `&#39;` because `&#39;` is applied before `&amp;`.
///
/// Returns `Cow::Borrowed` when the input has nothing to decode.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let mut decoded = Cow::Borrowed(text);
    for (entity, glyph) in ENTITY_TABLE {
        if decoded.contains(entity) {
            decoded = Cow::Owned(decoded.replace(entity, glyph));
        }
    }
    decoded
}

/// Publication dates are passed through as opaque strings; only surrounding
/// whitespace is removed. No parsing or validation happens here.
pub fn normalize_date(text: &str) -> &str {
    text.trim()
}

/// Key used by the recently-seen cache.
///
/// The guid when there is one, otherwise a SHA-256 over title and description
/// so that link-less, guid-less items still collapse onto one key.
pub fn dedupe_key(item: &Item) -> String {
    let guid = item.guid.trim();
    if !guid.is_empty() {
        return guid.to_string();
    }

    let input = format!("{}|{}", item.title, item.description);
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}
