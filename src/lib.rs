//! Periodic RSS/Atom collection with tolerant markup extraction.
//!
//! Sources are polled on a fixed interval, items are extracted with
//! tag-scoped patterns rather than an XML parser, cleaned to plain text, and
//! forwarded as JSON to a storage sink.

pub mod collector;
pub mod config;
pub mod feed;
pub mod util;
