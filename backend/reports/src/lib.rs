//! Report pipeline for `/voicestats`.
//!
//! Aggregation rows are resolved to display labels (concurrently, with
//! placeholders on failure), converted to hours and rendered as a bar chart.
//! Every failure on this path becomes a localized text reply.

pub mod labels;
pub mod messages;
pub mod png;
pub mod retry;
pub mod service;

pub use labels::{placeholder_label, resolve_labels};
pub use messages::{Locale, Messages};
pub use png::PngBarChart;
pub use retry::{retry_transient, FailureClass, RetryPolicy};
pub use service::{ReportReply, ReportRequest, ReportRow, ReportService};
