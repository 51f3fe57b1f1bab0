use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use voicetally_core::{
    ChannelRegistry, ChannelUserSession, RankedTotal, Result, SessionStore, VoiceTallyError,
};

type SessionKey = (String, String);

#[derive(Default)]
struct Tables {
    sessions: HashMap<SessionKey, ChannelUserSession>,
    channels: HashMap<String, String>,
}

/// Non-durable store with the same semantics as [`crate::SqliteStore`].
///
/// Used by tests and by `serve --in-memory`.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    closed: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(VoiceTallyError::Storage("store closed".into()));
        }
        self.tables
            .read()
            .map_err(|_| VoiceTallyError::Storage("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(VoiceTallyError::Storage("store closed".into()));
        }
        self.tables
            .write()
            .map_err(|_| VoiceTallyError::Storage("in-memory store lock poisoned".into()))
    }

    fn rank<F>(&self, group_id: &str, limit: usize, key_of: F) -> Result<Vec<RankedTotal>>
    where
        F: Fn(&ChannelUserSession) -> &str,
    {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let tables = self.read()?;
        let mut totals: HashMap<&str, i64> = HashMap::new();
        for session in tables.sessions.values() {
            let in_group = tables
                .channels
                .get(&session.channel_id)
                .is_some_and(|g| g == group_id);
            if in_group {
                let total = totals.entry(key_of(session)).or_insert(0);
                *total = total.saturating_add(session.total_time_ms);
            }
        }

        let mut ranked: Vec<RankedTotal> = totals
            .into_iter()
            .map(|(key, total)| RankedTotal::new(key, total))
            .collect();
        ranked.sort_by(|a, b| {
            b.total_time_ms
                .cmp(&a.total_time_ms)
                .then_with(|| a.key.cmp(&b.key))
        });
        ranked.truncate(limit);
        Ok(ranked)
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn upsert_open_session(
        &self,
        channel_id: &str,
        user_id: &str,
        timestamp_ms: i64,
    ) -> Result<()> {
        let mut tables = self.write()?;
        let session = tables
            .sessions
            .entry((channel_id.to_string(), user_id.to_string()))
            .or_insert_with(|| ChannelUserSession {
                channel_id: channel_id.to_string(),
                user_id: user_id.to_string(),
                total_time_ms: 0,
                last_join: None,
            });
        session.last_join = Some(timestamp_ms);
        Ok(())
    }

    async fn close_session(
        &self,
        channel_id: &str,
        user_id: &str,
        timestamp_ms: i64,
    ) -> Result<Option<i64>> {
        let mut tables = self.write()?;
        let key = (channel_id.to_string(), user_id.to_string());
        let Some(session) = tables.sessions.get_mut(&key) else {
            return Ok(None);
        };
        let Some(last_join) = session.last_join.take() else {
            return Ok(None);
        };
        let duration = timestamp_ms.saturating_sub(last_join).max(0);
        session.total_time_ms = session.total_time_ms.saturating_add(duration);
        Ok(Some(duration))
    }

    async fn get_session(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<Option<ChannelUserSession>> {
        let tables = self.read()?;
        Ok(tables
            .sessions
            .get(&(channel_id.to_string(), user_id.to_string()))
            .cloned())
    }

    async fn sum_by_channel(&self, group_id: &str, limit: usize) -> Result<Vec<RankedTotal>> {
        self.rank(group_id, limit, |s| s.channel_id.as_str())
    }

    async fn sum_by_user(&self, group_id: &str, limit: usize) -> Result<Vec<RankedTotal>> {
        self.rank(group_id, limit, |s| s.user_id.as_str())
    }

    async fn open_sessions(&self, group_id: Option<&str>) -> Result<Vec<ChannelUserSession>> {
        let tables = self.read()?;
        let mut open: Vec<ChannelUserSession> = tables
            .sessions
            .values()
            .filter(|s| s.is_open())
            .filter(|s| match group_id {
                Some(group_id) => tables
                    .channels
                    .get(&s.channel_id)
                    .is_some_and(|g| g == group_id),
                None => true,
            })
            .cloned()
            .collect();
        open.sort_by_key(|s| s.last_join);
        Ok(open)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl ChannelRegistry for InMemoryStore {
    async fn register(&self, channel_id: &str, group_id: &str) -> Result<()> {
        let mut tables = self.write()?;
        tables
            .channels
            .insert(channel_id.to_string(), group_id.to_string());
        Ok(())
    }

    async fn channels_of(&self, group_id: &str) -> Result<BTreeSet<String>> {
        let tables = self.read()?;
        Ok(tables
            .channels
            .iter()
            .filter(|(_, g)| g.as_str() == group_id)
            .map(|(c, _)| c.clone())
            .collect())
    }

    async fn group_of(&self, channel_id: &str) -> Result<Option<String>> {
        let tables = self.read()?;
        Ok(tables.channels.get(channel_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejoin_preserves_total() {
        let store = InMemoryStore::new();
        store.register("c1", "g1").await.unwrap();
        store.upsert_open_session("c1", "u1", 1_000).await.unwrap();
        store.close_session("c1", "u1", 5_000).await.unwrap();
        store.upsert_open_session("c1", "u1", 6_000).await.unwrap();

        let session = store.get_session("c1", "u1").await.unwrap().unwrap();
        assert_eq!(session.total_time_ms, 4_000);
        assert_eq!(session.last_join, Some(6_000));
    }

    #[tokio::test]
    async fn test_ranking_matches_sqlite_semantics() {
        let store = InMemoryStore::new();
        store.register("c1", "g1").await.unwrap();
        store.register("c2", "g1").await.unwrap();
        store.register("c9", "other").await.unwrap();
        for (channel, user, end) in [("c1", "a", 10), ("c2", "a", 20), ("c2", "b", 5), ("c9", "z", 500)] {
            store.upsert_open_session(channel, user, 0).await.unwrap();
            store.close_session(channel, user, end).await.unwrap();
        }

        let users = store.sum_by_user("g1", 10).await.unwrap();
        assert_eq!(users, vec![RankedTotal::new("a", 30), RankedTotal::new("b", 5)]);

        let channels = store.sum_by_channel("g1", 1).await.unwrap();
        assert_eq!(channels, vec![RankedTotal::new("c2", 25)]);
    }

    #[tokio::test]
    async fn test_closed_store_rejects_calls() {
        let store = InMemoryStore::new();
        store.close().await.unwrap();
        assert!(store.register("c1", "g1").await.unwrap_err().is_storage());
    }

    #[tokio::test]
    async fn test_extreme_timestamps_saturate() {
        let store = InMemoryStore::new();
        store.upsert_open_session("c1", "u1", -1).await.unwrap();
        assert_eq!(store.close_session("c1", "u1", i64::MAX).await.unwrap(), Some(i64::MAX));
        store.upsert_open_session("c1", "u1", i64::MAX).await.unwrap();
        assert_eq!(store.close_session("c1", "u1", i64::MIN).await.unwrap(), Some(0));
        let session = store.get_session("c1", "u1").await.unwrap().unwrap();
        assert_eq!(session.total_time_ms, i64::MAX);
    }
}
