//! Utility functions for common operations.
//!
//! - **URL validation**: scheme and host checks for feed sources and the sink

mod url_validator;

pub use url_validator::{validate_sink_url, validate_source_url, UrlValidationError};
