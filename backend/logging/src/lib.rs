//! Structured logging components for voicetally.
//!
//! Console output (human-readable or JSON), optional daily-rolling NDJSON files,
//! and token redaction for strings that may carry credentials.

pub mod logger;
pub mod redact;

pub use logger::{build_filter, init_logger};
pub use redact::redact_sensitive_data;
