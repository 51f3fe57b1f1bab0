//! Read-only ranking queries over the session store.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use voicetally_core::{RankedTotal, Result, SessionStore, StatKind, VoiceTallyError};

/// Top-N rankings of closed-session time, in raw milliseconds.
pub struct AggregationEngine<S> {
    store: Arc<S>,
    timeout: Option<Duration>,
}

impl<S> AggregationEngine<S>
where
    S: SessionStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            timeout: None,
        }
    }

    /// Abandon any query running longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub async fn top_channels_by_time(&self, group_id: &str, limit: usize) -> Result<Vec<RankedTotal>> {
        self.top(StatKind::Channel, group_id, limit).await
    }

    pub async fn top_users_by_time(&self, group_id: &str, limit: usize) -> Result<Vec<RankedTotal>> {
        self.top(StatKind::User, group_id, limit).await
    }

    /// Ranking for `kind`; an unknown or empty group yields an empty list.
    pub async fn top(&self, kind: StatKind, group_id: &str, limit: usize) -> Result<Vec<RankedTotal>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        // Run on its own task so the timeout still fires while a store call blocks.
        let store = Arc::clone(&self.store);
        let group = group_id.to_string();
        let mut query = tokio::spawn(async move {
            match kind {
                StatKind::Channel => store.sum_by_channel(&group, limit).await,
                StatKind::User => store.sum_by_user(&group, limit).await,
            }
        });

        let joined = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, &mut query).await {
                Ok(joined) => joined,
                Err(_) => {
                    query.abort();
                    let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                    warn!(%kind, group_id, timeout_ms, "Aggregation query timed out");
                    return Err(VoiceTallyError::Timeout(timeout_ms));
                }
            },
            None => query.await,
        };
        let mut rows = joined
            .map_err(|e| VoiceTallyError::Storage(format!("aggregation task failed: {e}")))??;

        // Stores already order and truncate; enforce the contract regardless.
        rows.sort_by(|a, b| b.total_time_ms.cmp(&a.total_time_ms));
        rows.truncate(limit);

        debug!(%kind, group_id, rows = rows.len(), "Aggregation complete");
        Ok(rows)
    }
}
