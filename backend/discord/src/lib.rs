//! Discord side of voicetally.
//!
//! Voice-state updates are translated into presence events and queued on the
//! presence bus; `/voicestats` interactions are answered through the report
//! service.

pub mod adapter;
pub mod commands;
pub mod labels;
pub mod presence;

pub use adapter::DiscordAdapter;
pub use labels::DiscordLabelResolver;
