//! The collection pipeline: source registry, scheduler loop, and sink forwarding.
//!
//! Each cycle walks the [`SourceRegistry`] in order and, per source, runs
//! fetch → extract → normalize → forward. One background task does all of
//! it; see [`Collector`] for lifecycle and cancellation.

mod forwarder;
mod scheduler;
mod seen;
mod source;

pub use forwarder::{ArticlePayload, Forwarder};
pub use scheduler::{
    CollectError, Collector, CollectorState, CollectorStatus, CycleReport, SetupError,
};
pub use seen::RecentlySeen;
pub use source::{Source, SourceRegistry};
