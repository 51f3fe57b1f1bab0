//! Presence event processor: turns join/leave/switch events into session
//! store mutations.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use voicetally_core::{
    ChannelRegistry, PresenceEvent, Result, SessionStore, Transition, VoiceTallyError,
};

use crate::locks::SessionLocks;

/// What applying one event did to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Joined,
    /// `applied` is `None` when there was no open session to close.
    Left { applied: Option<i64> },
    Switched { applied: Option<i64> },
    Ignored,
}

/// Sole writer of the session store and channel registry.
pub struct PresenceProcessor<S> {
    store: Arc<S>,
    locks: SessionLocks,
}

impl<S> PresenceProcessor<S>
where
    S: SessionStore + ChannelRegistry,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: SessionLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Apply one presence event. Storage failures are returned, never retried.
    pub async fn apply(&self, event: &PresenceEvent) -> Result<Outcome> {
        if event.user_id.is_empty() {
            return Err(VoiceTallyError::InvalidEvent("empty user id".into()));
        }

        let transition = event.transition();
        if transition == Transition::Ignored {
            return Ok(Outcome::Ignored);
        }

        // The two halves of a switch must not interleave with another event for this user.
        let _guard = self.locks.acquire(&event.user_id).await;

        match transition {
            Transition::Join { channel_id } => {
                self.join(&channel_id, event).await?;
                Ok(Outcome::Joined)
            }
            Transition::Leave { channel_id } => {
                let applied = self.leave(&channel_id, event).await?;
                Ok(Outcome::Left { applied })
            }
            Transition::Switch { from, to } => {
                let applied = self.leave(&from, event).await?;
                self.join(&to, event).await?;
                Ok(Outcome::Switched { applied })
            }
            Transition::Ignored => Ok(Outcome::Ignored),
        }
    }

    async fn join(&self, channel_id: &str, event: &PresenceEvent) -> Result<()> {
        self.store.register(channel_id, &event.group_id).await?;
        self.store
            .upsert_open_session(channel_id, &event.user_id, event.timestamp_ms)
            .await?;
        info!(
            channel_id,
            user_id = %event.user_id,
            group_id = %event.group_id,
            "User joined voice channel"
        );
        Ok(())
    }

    async fn leave(&self, channel_id: &str, event: &PresenceEvent) -> Result<Option<i64>> {
        let applied = self
            .store
            .close_session(channel_id, &event.user_id, event.timestamp_ms)
            .await?;
        match applied {
            Some(duration_ms) => info!(
                channel_id,
                user_id = %event.user_id,
                duration_ms,
                "User left voice channel"
            ),
            None => debug!(
                channel_id,
                user_id = %event.user_id,
                "Leave without an open session; nothing to record"
            ),
        }
        Ok(applied)
    }

    /// Consume presence events until every sender is dropped.
    ///
    /// A failed event is logged for the operator and processing moves on; the
    /// event source decides whether to redeliver.
    pub async fn run(&self, mut rx: mpsc::Receiver<PresenceEvent>) {
        info!("Presence processor started");
        let mut failures: u64 = 0;

        while let Some(event) = rx.recv().await {
            match self.apply(&event).await {
                Ok(outcome) => debug!(?outcome, "Presence event applied"),
                Err(e) if e.is_storage() => {
                    failures += 1;
                    error!(
                        error = %e,
                        user_id = %event.user_id,
                        group_id = %event.group_id,
                        previous_channel_id = ?event.previous_channel_id,
                        new_channel_id = ?event.new_channel_id,
                        timestamp_ms = event.timestamp_ms,
                        failures,
                        "Failed to record presence event; accounting may be incomplete"
                    );
                }
                Err(e) => warn!(error = %e, "Rejected presence event"),
            }
        }

        info!(failures, "Presence processor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use async_trait::async_trait;
    use voicetally_core::{ChannelUserSession, RankedTotal};
    use voicetally_store::{InMemoryStore, SqliteStore};

    fn sqlite() -> PresenceProcessor<SqliteStore> {
        PresenceProcessor::new(Arc::new(SqliteStore::in_memory().unwrap()))
    }

    async fn total<S: SessionStore + ChannelRegistry>(p: &PresenceProcessor<S>, c: &str, u: &str) -> i64 {
        p.store()
            .get_session(c, u)
            .await
            .unwrap()
            .map(|s| s.total_time_ms)
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn join_leave_scenario() {
        let p = sqlite();
        p.apply(&PresenceEvent::join("C", "U", "G", 1_000)).await.unwrap();
        let out = p.apply(&PresenceEvent::leave("C", "U", "G", 5_000)).await.unwrap();
        assert_eq!(out, Outcome::Left { applied: Some(4_000) });
        assert_eq!(total(&p, "C", "U").await, 4_000);

        p.apply(&PresenceEvent::join("C", "U", "G", 6_000)).await.unwrap();
        p.apply(&PresenceEvent::leave("C", "U", "G", 6_500)).await.unwrap();
        assert_eq!(total(&p, "C", "U").await, 4_500);
    }

    #[tokio::test]
    async fn join_registers_channel() {
        let p = sqlite();
        p.apply(&PresenceEvent::join("C", "U", "G", 0)).await.unwrap();
        assert_eq!(p.store().group_of("C").await.unwrap().as_deref(), Some("G"));
        let session = p.store().get_session("C", "U").await.unwrap().unwrap();
        assert_eq!(session.last_join, Some(0));
        assert_eq!(session.total_time_ms, 0);
    }

    #[tokio::test]
    async fn total_equals_sum_of_completed_pairs() {
        let p = sqlite();
        let pairs = [(0, 10), (20, 45), (100, 101), (1_000, 3_000)];
        for (join, leave) in pairs {
            p.apply(&PresenceEvent::join("C", "U", "G", join)).await.unwrap();
            p.apply(&PresenceEvent::leave("C", "U", "G", leave)).await.unwrap();
        }
        // trailing unmatched join
        p.apply(&PresenceEvent::join("C", "U", "G", 5_000)).await.unwrap();

        let expected: i64 = pairs.iter().map(|(j, l)| l - j).sum();
        assert_eq!(total(&p, "C", "U").await, expected);
    }

    #[tokio::test]
    async fn leave_without_session_is_noop() {
        let p = sqlite();
        let out = p.apply(&PresenceEvent::leave("C", "U", "G", 5_000)).await.unwrap();
        assert_eq!(out, Outcome::Left { applied: None });
        assert!(p.store().get_session("C", "U").await.unwrap().is_none());
        assert!(p.store().group_of("C").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_leave_applies_once() {
        let p = sqlite();
        p.apply(&PresenceEvent::join("C", "U", "G", 0)).await.unwrap();
        let leave = PresenceEvent::leave("C", "U", "G", 700);
        p.apply(&leave).await.unwrap();
        let second = p.apply(&leave).await.unwrap();
        assert_eq!(second, Outcome::Left { applied: None });
        assert_eq!(total(&p, "C", "U").await, 700);
    }

    #[tokio::test]
    async fn switch_is_leave_then_join() {
        let p = sqlite();
        p.apply(&PresenceEvent::join("C1", "U", "G", 0)).await.unwrap();
        let out = p
            .apply(&PresenceEvent::switch("C1", "C2", "U", "G", 3_000))
            .await
            .unwrap();
        assert_eq!(out, Outcome::Switched { applied: Some(3_000) });

        let c1 = p.store().get_session("C1", "U").await.unwrap().unwrap();
        assert_eq!(c1.total_time_ms, 3_000);
        assert!(!c1.is_open());

        let c2 = p.store().get_session("C2", "U").await.unwrap().unwrap();
        assert_eq!(c2.last_join, Some(3_000));
        assert_eq!(c2.total_time_ms, 0);
        assert_eq!(p.store().group_of("C2").await.unwrap().as_deref(), Some("G"));
    }

    #[tokio::test]
    async fn switch_from_untracked_channel_still_joins() {
        let p = sqlite();
        let out = p
            .apply(&PresenceEvent::switch("C1", "C2", "U", "G", 3_000))
            .await
            .unwrap();
        assert_eq!(out, Outcome::Switched { applied: None });
        assert!(p.store().get_session("C2", "U").await.unwrap().unwrap().is_open());
    }

    #[tokio::test]
    async fn same_channel_update_is_ignored() {
        let p = sqlite();
        p.apply(&PresenceEvent::join("C", "U", "G", 0)).await.unwrap();
        let out = p
            .apply(&PresenceEvent::switch("C", "C", "U", "G", 9_000))
            .await
            .unwrap();
        assert_eq!(out, Outcome::Ignored);
        let session = p.store().get_session("C", "U").await.unwrap().unwrap();
        assert_eq!(session.last_join, Some(0));
    }

    #[tokio::test]
    async fn clock_skew_clamps_to_zero() {
        let p = sqlite();
        p.apply(&PresenceEvent::join("C", "U", "G", 10_000)).await.unwrap();
        let out = p.apply(&PresenceEvent::leave("C", "U", "G", 2_000)).await.unwrap();
        assert_eq!(out, Outcome::Left { applied: Some(0) });
        assert_eq!(total(&p, "C", "U").await, 0);
    }

    #[tokio::test]
    async fn duplicate_join_resets_last_join_only() {
        let p = PresenceProcessor::new(Arc::new(InMemoryStore::new()));
        p.apply(&PresenceEvent::join("C", "U", "G", 0)).await.unwrap();
        p.apply(&PresenceEvent::leave("C", "U", "G", 100)).await.unwrap();
        p.apply(&PresenceEvent::join("C", "U", "G", 200)).await.unwrap();
        p.apply(&PresenceEvent::join("C", "U", "G", 300)).await.unwrap();
        let session = p.store().get_session("C", "U").await.unwrap().unwrap();
        assert_eq!(session.total_time_ms, 100);
        assert_eq!(session.last_join, Some(300));
    }

    #[tokio::test]
    async fn empty_user_is_rejected() {
        let p = sqlite();
        let err = p.apply(&PresenceEvent::join("C", "", "G", 0)).await.unwrap_err();
        assert!(matches!(err, VoiceTallyError::InvalidEvent(_)));
    }

    #[tokio::test]
    async fn run_drains_bus_in_order() {
        let p = sqlite();
        let (tx, rx) = mpsc::channel(8);
        tx.send(PresenceEvent::join("C", "U", "G", 0)).await.unwrap();
        tx.send(PresenceEvent::switch("C", "D", "U", "G", 50)).await.unwrap();
        tx.send(PresenceEvent::leave("D", "U", "G", 80)).await.unwrap();
        drop(tx);

        p.run(rx).await;
        assert_eq!(total(&p, "C", "U").await, 50);
        assert_eq!(total(&p, "D", "U").await, 30);
    }

    #[tokio::test]
    async fn concurrent_events_for_one_user_are_serialized() {
        let p = Arc::new(PresenceProcessor::new(Arc::new(InMemoryStore::new())));
        p.apply(&PresenceEvent::join("C", "U", "G", 0)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let p = Arc::clone(&p);
            handles.push(tokio::spawn(async move {
                p.apply(&PresenceEvent::leave("C", "U", "G", 1_000)).await.unwrap()
            }));
        }
        let mut applied = 0;
        for handle in handles {
            if let Outcome::Left { applied: Some(_) } = handle.await.unwrap() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(total(&p, "C", "U").await, 1_000);
    }

    /// Store whose every write fails, to check that errors surface to the caller.
    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn upsert_open_session(&self, _: &str, _: &str, _: i64) -> Result<()> {
            Err(VoiceTallyError::storage("disk full"))
        }
        async fn close_session(&self, _: &str, _: &str, _: i64) -> Result<Option<i64>> {
            Err(VoiceTallyError::storage("disk full"))
        }
        async fn get_session(&self, _: &str, _: &str) -> Result<Option<ChannelUserSession>> {
            Ok(None)
        }
        async fn sum_by_channel(&self, _: &str, _: usize) -> Result<Vec<RankedTotal>> {
            Ok(Vec::new())
        }
        async fn sum_by_user(&self, _: &str, _: usize) -> Result<Vec<RankedTotal>> {
            Ok(Vec::new())
        }
        async fn open_sessions(&self, _: Option<&str>) -> Result<Vec<ChannelUserSession>> {
            Ok(Vec::new())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl ChannelRegistry for BrokenStore {
        async fn register(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn channels_of(&self, _: &str) -> Result<BTreeSet<String>> {
            Ok(BTreeSet::new())
        }
        async fn group_of(&self, _: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn storage_failure_surfaces() {
        let p = PresenceProcessor::new(Arc::new(BrokenStore));
        let err = p.apply(&PresenceEvent::join("C", "U", "G", 0)).await.unwrap_err();
        assert!(err.is_storage());
        let err = p.apply(&PresenceEvent::leave("C", "U", "G", 1)).await.unwrap_err();
        assert!(err.is_storage());
    }

    #[tokio::test]
    async fn run_survives_storage_failures() {
        let p = PresenceProcessor::new(Arc::new(BrokenStore));
        let (tx, rx) = mpsc::channel(4);
        tx.send(PresenceEvent::join("C", "U", "G", 0)).await.unwrap();
        tx.send(PresenceEvent::leave("C", "U", "G", 1)).await.unwrap();
        drop(tx);
        // returns once the bus is drained instead of stopping at the first error
        p.run(rx).await;
    }
}
