use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::chart::{ChartSpec, RenderedChart};
use crate::error::Result;
use crate::types::{ChannelUserSession, RankedTotal, StatKind};

/// Durable per-(channel, user) time accounting.
///
/// Every method is a single atomic unit with respect to other calls on the
/// same store; implementations may block on I/O.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Open (or re-open) a session at `timestamp_ms`, keeping any accumulated total.
    async fn upsert_open_session(&self, channel_id: &str, user_id: &str, timestamp_ms: i64)
        -> Result<()>;

    /// Close the open session, if there is one, and return the duration added.
    ///
    /// Returns `None` without writing when no row exists or the row is already closed.
    async fn close_session(&self, channel_id: &str, user_id: &str, timestamp_ms: i64)
        -> Result<Option<i64>>;

    async fn get_session(&self, channel_id: &str, user_id: &str)
        -> Result<Option<ChannelUserSession>>;

    /// Closed-session totals per channel of `group_id`, largest first.
    async fn sum_by_channel(&self, group_id: &str, limit: usize) -> Result<Vec<RankedTotal>>;

    /// Closed-session totals per user across the channels of `group_id`, largest first.
    async fn sum_by_user(&self, group_id: &str, limit: usize) -> Result<Vec<RankedTotal>>;

    /// All sessions currently open, optionally restricted to one group.
    async fn open_sessions(&self, group_id: Option<&str>) -> Result<Vec<ChannelUserSession>>;

    /// Release the underlying storage. Later calls fail with a storage error.
    async fn close(&self) -> Result<()>;
}

/// Durable channel -> owning group mapping.
#[async_trait]
pub trait ChannelRegistry: Send + Sync {
    /// Idempotent upsert; the latest `group_id` wins.
    async fn register(&self, channel_id: &str, group_id: &str) -> Result<()>;

    async fn channels_of(&self, group_id: &str) -> Result<BTreeSet<String>>;

    async fn group_of(&self, channel_id: &str) -> Result<Option<String>>;
}

/// Resolves channel and user ids to human-readable names.
#[async_trait]
pub trait LabelResolver: Send + Sync {
    async fn resolve(&self, kind: StatKind, id: &str) -> Result<String>;
}

/// Turns a ranked bar-chart description into an image.
pub trait ChartRenderer: Send + Sync {
    fn render(&self, spec: &ChartSpec) -> Result<RenderedChart>;
}
