use std::num::NonZeroU64;
use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::{ChannelId, Http, UserId};

use voicetally_core::{LabelResolver, Result, StatKind, VoiceTallyError};

/// Looks up channel names and usernames over the Discord REST API.
pub struct DiscordLabelResolver {
    http: Arc<Http>,
}

impl DiscordLabelResolver {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

fn lookup_error(kind: StatKind, id: &str, message: impl ToString) -> VoiceTallyError {
    VoiceTallyError::Lookup {
        kind: kind.to_string(),
        id: id.to_string(),
        message: message.to_string(),
    }
}

/// Discord snowflakes are non-zero u64s.
pub fn parse_snowflake(kind: StatKind, id: &str) -> Result<u64> {
    id.parse::<NonZeroU64>()
        .map(NonZeroU64::get)
        .map_err(|e| lookup_error(kind, id, format!("invalid snowflake: {e}")))
}

#[async_trait]
impl LabelResolver for DiscordLabelResolver {
    async fn resolve(&self, kind: StatKind, id: &str) -> Result<String> {
        let snowflake = parse_snowflake(kind, id)?;
        match kind {
            StatKind::Channel => {
                let channel = self
                    .http
                    .get_channel(ChannelId::new(snowflake))
                    .await
                    .map_err(|e| lookup_error(kind, id, e))?;
                channel
                    .guild()
                    .map(|c| c.name)
                    .ok_or_else(|| lookup_error(kind, id, "not a guild channel"))
            }
            StatKind::User => {
                let user = self
                    .http
                    .get_user(UserId::new(snowflake))
                    .await
                    .map_err(|e| lookup_error(kind, id, e))?;
                Ok(user.name)
            }
        }
    }
}
