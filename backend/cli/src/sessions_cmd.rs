//! `voicetally sessions`: list sessions that are currently open.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};

use voicetally_core::{ChannelUserSession, SessionStore};

use crate::terminal_output::{render_table, Column};

pub async fn run<S>(store: Arc<S>, guild_id: Option<&str>) -> Result<()>
where
    S: SessionStore + 'static,
{
    let sessions = store.open_sessions(guild_id).await?;
    if sessions.is_empty() {
        println!("No open sessions.");
        return Ok(());
    }
    print!("{}", format_sessions(&sessions, Utc::now()));
    Ok(())
}

pub fn format_sessions(sessions: &[ChannelUserSession], now: DateTime<Utc>) -> String {
    let columns = vec![
        Column::left("Channel"),
        Column::left("User"),
        Column::left("Joined"),
        Column::right("Open for"),
    ];
    let rows: Vec<Vec<String>> = sessions
        .iter()
        .map(|s| {
            let joined = s.last_join.and_then(DateTime::from_timestamp_millis);
            vec![
                s.channel_id.clone(),
                s.user_id.clone(),
                joined
                    .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string()),
                joined
                    .map(|t| format_elapsed((now - t).num_seconds()))
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    render_table(&columns, &rows)
}

fn format_elapsed(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{}h {:02}m", seconds / 3600, (seconds % 3600) / 60)
}
