//! SQLite-backed session store and channel registry.
//!
//! Layout is compatible with databases written by earlier versions of the bot:
//! `channel_user_time(channel_id, user_id, total_time, last_join)` keyed by
//! `(channel_id, user_id)`, and `channels(id, guild_id)`.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use voicetally_core::{
    ChannelRegistry, ChannelUserSession, RankedTotal, Result, SessionStore, VoiceTallyError,
};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS channel_user_time (
        channel_id TEXT NOT NULL,
        user_id    TEXT NOT NULL,
        total_time INTEGER NOT NULL DEFAULT 0,
        last_join  INTEGER,
        PRIMARY KEY (channel_id, user_id)
    );
    CREATE TABLE IF NOT EXISTS channels (
        id       TEXT PRIMARY KEY,
        guild_id TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_channels_guild_id ON channels(guild_id);";

const SUM_BY_CHANNEL: &str = "SELECT t.channel_id, COALESCE(SUM(t.total_time), 0) AS total
     FROM channel_user_time t
     JOIN channels c ON c.id = t.channel_id
     WHERE c.guild_id = ?1
     GROUP BY t.channel_id
     ORDER BY total DESC, t.channel_id ASC
     LIMIT ?2";

const SUM_BY_USER: &str = "SELECT t.user_id, COALESCE(SUM(t.total_time), 0) AS total
     FROM channel_user_time t
     JOIN channels c ON c.id = t.channel_id
     WHERE c.guild_id = ?1
     GROUP BY t.user_id
     ORDER BY total DESC, t.user_id ASC
     LIMIT ?2";

/// Durable store over a single SQLite connection.
///
/// Every trait call runs on the blocking thread pool while holding the
/// connection mutex, so each call (including the read-modify-write in
/// [`SessionStore::close_session`]) completes before any other call touches
/// the database. A caller that stops waiting does not cancel the SQL; the
/// next call waits for it to finish.
pub struct SqliteStore {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(VoiceTallyError::storage)?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(VoiceTallyError::storage)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(VoiceTallyError::storage)?;
        let store = Self::with_connection(conn)?;
        info!(path = %path.display(), "Session store opened");
        Ok(store)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(VoiceTallyError::storage)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(VoiceTallyError::storage)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Run `op` against the open connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|p| p.into_inner());
            let conn = guard.as_mut().ok_or_else(closed)?;
            op(conn)
        })
        .await
        .map_err(|e| VoiceTallyError::Storage(format!("store task failed: {e}")))?
    }

    async fn sum_by(&self, sql: &'static str, group_id: &str, limit: usize) -> Result<Vec<RankedTotal>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let group_id = group_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(sql).map_err(VoiceTallyError::storage)?;
            let rows = stmt
                .query_map(params![group_id, limit], |row| {
                    Ok(RankedTotal {
                        key: row.get(0)?,
                        total_time_ms: row.get(1)?,
                    })
                })
                .map_err(VoiceTallyError::storage)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(VoiceTallyError::storage)?;
            Ok(rows)
        })
        .await
    }
}

fn closed() -> VoiceTallyError {
    VoiceTallyError::Storage("store closed".into())
}

/// Time between `last_join` and `timestamp_ms`; skewed clocks count as zero.
fn session_duration(last_join: i64, timestamp_ms: i64) -> i64 {
    timestamp_ms.saturating_sub(last_join).max(0)
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChannelUserSession> {
    Ok(ChannelUserSession {
        channel_id: row.get(0)?,
        user_id: row.get(1)?,
        total_time_ms: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
        last_join: row.get(3)?,
    })
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn upsert_open_session(
        &self,
        channel_id: &str,
        user_id: &str,
        timestamp_ms: i64,
    ) -> Result<()> {
        let (channel_id, user_id) = (channel_id.to_string(), user_id.to_string());
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(VoiceTallyError::storage)?;

            // Never clobber accumulated time on re-join.
            let existing: Option<Option<i64>> = tx
                .query_row(
                    "SELECT total_time FROM channel_user_time WHERE channel_id = ?1 AND user_id = ?2",
                    params![channel_id, user_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(VoiceTallyError::storage)?;
            let total = existing.flatten().unwrap_or(0);

            tx.execute(
                "INSERT INTO channel_user_time (channel_id, user_id, total_time, last_join)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(channel_id, user_id) DO UPDATE SET
                   total_time = excluded.total_time,
                   last_join = excluded.last_join",
                params![channel_id, user_id, total, timestamp_ms],
            )
            .map_err(VoiceTallyError::storage)?;
            tx.commit().map_err(VoiceTallyError::storage)?;

            debug!(%channel_id, %user_id, timestamp_ms, total_time_ms = total, "Session opened");
            Ok(())
        })
        .await
    }

    async fn close_session(
        &self,
        channel_id: &str,
        user_id: &str,
        timestamp_ms: i64,
    ) -> Result<Option<i64>> {
        let (channel_id, user_id) = (channel_id.to_string(), user_id.to_string());
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(VoiceTallyError::storage)?;

            let row: Option<(Option<i64>, Option<i64>)> = tx
                .query_row(
                    "SELECT last_join, total_time FROM channel_user_time
                     WHERE channel_id = ?1 AND user_id = ?2",
                    params![channel_id, user_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(VoiceTallyError::storage)?;

            let Some((Some(last_join), total)) = row else {
                debug!(%channel_id, %user_id, "No open session to close");
                return Ok(None);
            };

            let duration = session_duration(last_join, timestamp_ms);
            let new_total = total.unwrap_or(0).saturating_add(duration);
            tx.execute(
                "UPDATE channel_user_time SET total_time = ?1, last_join = NULL
                 WHERE channel_id = ?2 AND user_id = ?3",
                params![new_total, channel_id, user_id],
            )
            .map_err(VoiceTallyError::storage)?;
            tx.commit().map_err(VoiceTallyError::storage)?;

            debug!(
                %channel_id,
                %user_id,
                duration_ms = duration,
                total_time_ms = new_total,
                "Session closed"
            );
            Ok(Some(duration))
        })
        .await
    }

    async fn get_session(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<Option<ChannelUserSession>> {
        let (channel_id, user_id) = (channel_id.to_string(), user_id.to_string());
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT channel_id, user_id, total_time, last_join FROM channel_user_time
                 WHERE channel_id = ?1 AND user_id = ?2",
                params![channel_id, user_id],
                row_to_session,
            )
            .optional()
            .map_err(VoiceTallyError::storage)
        })
        .await
    }

    async fn sum_by_channel(&self, group_id: &str, limit: usize) -> Result<Vec<RankedTotal>> {
        self.sum_by(SUM_BY_CHANNEL, group_id, limit).await
    }

    async fn sum_by_user(&self, group_id: &str, limit: usize) -> Result<Vec<RankedTotal>> {
        self.sum_by(SUM_BY_USER, group_id, limit).await
    }

    async fn open_sessions(&self, group_id: Option<&str>) -> Result<Vec<ChannelUserSession>> {
        let group_id = group_id.map(str::to_string);
        self.with_conn(move |conn| {
            let sessions = match group_id {
                Some(group_id) => {
                    let mut stmt = conn
                        .prepare(
                            "SELECT t.channel_id, t.user_id, t.total_time, t.last_join
                             FROM channel_user_time t
                             JOIN channels c ON c.id = t.channel_id
                             WHERE t.last_join IS NOT NULL AND c.guild_id = ?1
                             ORDER BY t.last_join ASC",
                        )
                        .map_err(VoiceTallyError::storage)?;
                    let rows = stmt
                        .query_map(params![group_id], row_to_session)
                        .map_err(VoiceTallyError::storage)?
                        .collect::<rusqlite::Result<Vec<_>>>();
                    rows
                }
                None => {
                    let mut stmt = conn
                        .prepare(
                            "SELECT channel_id, user_id, total_time, last_join
                             FROM channel_user_time
                             WHERE last_join IS NOT NULL
                             ORDER BY last_join ASC",
                        )
                        .map_err(VoiceTallyError::storage)?;
                    let rows = stmt
                        .query_map([], row_to_session)
                        .map_err(VoiceTallyError::storage)?
                        .collect::<rusqlite::Result<Vec<_>>>();
                    rows
                }
            };
            sessions.map_err(VoiceTallyError::storage)
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|p| p.into_inner());
            match guard.take() {
                Some(conn) => {
                    conn.close().map_err(|(_, e)| VoiceTallyError::storage(e))?;
                    info!("Session store closed");
                    Ok(())
                }
                None => Ok(()),
            }
        })
        .await
        .map_err(|e| VoiceTallyError::Storage(format!("store task failed: {e}")))?
    }
}

#[async_trait]
impl ChannelRegistry for SqliteStore {
    async fn register(&self, channel_id: &str, group_id: &str) -> Result<()> {
        let (channel_id, group_id) = (channel_id.to_string(), group_id.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO channels (id, guild_id) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET guild_id = excluded.guild_id",
                params![channel_id, group_id],
            )
            .map_err(VoiceTallyError::storage)?;
            Ok(())
        })
        .await
    }

    async fn channels_of(&self, group_id: &str) -> Result<BTreeSet<String>> {
        let group_id = group_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare("SELECT id FROM channels WHERE guild_id = ?1")
                .map_err(VoiceTallyError::storage)?;
            let ids = stmt
                .query_map(params![group_id], |row| row.get(0))
                .map_err(VoiceTallyError::storage)?
                .collect::<rusqlite::Result<BTreeSet<String>>>()
                .map_err(VoiceTallyError::storage)?;
            Ok(ids)
        })
        .await
    }

    async fn group_of(&self, channel_id: &str) -> Result<Option<String>> {
        let channel_id = channel_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT guild_id FROM channels WHERE id = ?1",
                params![channel_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(VoiceTallyError::storage)
        })
        .await
    }
}
