use serde::{Deserialize, Serialize};

/// A voice-channel membership change reported by the chat platform.
///
/// `previous_channel_id` / `new_channel_id` are `None` when the user was
/// (or now is) outside every voice channel of the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub previous_channel_id: Option<String>,
    pub new_channel_id: Option<String>,
    pub user_id: String,
    pub group_id: String,
    pub timestamp_ms: i64,
}

/// The state-machine step a presence event maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transition {
    /// Absent -> Present(channel)
    Join { channel_id: String },
    /// Present(channel) -> Absent
    Leave { channel_id: String },
    /// Present(from) -> Present(to); a leave on `from` then a join on `to`.
    Switch { from: String, to: String },
    /// No membership change.
    Ignored,
}

impl PresenceEvent {
    pub fn new(
        previous_channel_id: Option<&str>,
        new_channel_id: Option<&str>,
        user_id: impl Into<String>,
        group_id: impl Into<String>,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            previous_channel_id: previous_channel_id.map(str::to_string),
            new_channel_id: new_channel_id.map(str::to_string),
            user_id: user_id.into(),
            group_id: group_id.into(),
            timestamp_ms,
        }
    }

    pub fn join(channel_id: &str, user_id: &str, group_id: &str, timestamp_ms: i64) -> Self {
        Self::new(None, Some(channel_id), user_id, group_id, timestamp_ms)
    }

    pub fn leave(channel_id: &str, user_id: &str, group_id: &str, timestamp_ms: i64) -> Self {
        Self::new(Some(channel_id), None, user_id, group_id, timestamp_ms)
    }

    pub fn switch(from: &str, to: &str, user_id: &str, group_id: &str, timestamp_ms: i64) -> Self {
        Self::new(Some(from), Some(to), user_id, group_id, timestamp_ms)
    }

    /// Classify the event. Pure; touches no storage.
    pub fn transition(&self) -> Transition {
        match (&self.previous_channel_id, &self.new_channel_id) {
            (None, Some(to)) => Transition::Join {
                channel_id: to.clone(),
            },
            (Some(from), None) => Transition::Leave {
                channel_id: from.clone(),
            },
            (Some(from), Some(to)) if from != to => Transition::Switch {
                from: from.clone(),
                to: to.clone(),
            },
            _ => Transition::Ignored,
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transition::Join { channel_id } => write!(f, "join({channel_id})"),
            Transition::Leave { channel_id } => write!(f, "leave({channel_id})"),
            Transition::Switch { from, to } => write!(f, "switch({from} -> {to})"),
            Transition::Ignored => write!(f, "ignored"),
        }
    }
}
