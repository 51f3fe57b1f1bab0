use serde::{Deserialize, Serialize};

/// Milliseconds in one hour; aggregation totals are displayed in hours.
pub const MS_PER_HOUR: i64 = 3_600_000;

/// Default number of rows returned by ranking queries.
pub const DEFAULT_TOP_LIMIT: usize = 10;

/// Accumulated presence of one user in one voice channel.
///
/// `last_join` is `Some` exactly while the user has an open session in the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelUserSession {
    pub channel_id: String,
    pub user_id: String,
    /// Sum of all completed sessions, in milliseconds.
    pub total_time_ms: i64,
    /// Join timestamp (ms since epoch) of the open session, if any.
    pub last_join: Option<i64>,
}

impl ChannelUserSession {
    pub fn is_open(&self) -> bool {
        self.last_join.is_some()
    }
}

/// What a ranking groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    Channel,
    User,
}

impl StatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatKind::Channel => "channel",
            StatKind::User => "user",
        }
    }
}

impl std::fmt::Display for StatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StatKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "channel" => Ok(StatKind::Channel),
            "user" => Ok(StatKind::User),
            other => Err(format!("unknown stat kind '{other}' (expected 'channel' or 'user')")),
        }
    }
}

/// One row of a ranking: a channel id or user id with its closed-session total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedTotal {
    pub key: String,
    pub total_time_ms: i64,
}

impl RankedTotal {
    pub fn new(key: impl Into<String>, total_time_ms: i64) -> Self {
        Self {
            key: key.into(),
            total_time_ms,
        }
    }

    pub fn hours(&self) -> f64 {
        self.total_time_ms as f64 / MS_PER_HOUR as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_kind_parses_case_insensitively() {
        assert_eq!("channel".parse::<StatKind>().unwrap(), StatKind::Channel);
        assert_eq!(" User ".parse::<StatKind>().unwrap(), StatKind::User);
        assert!("guild".parse::<StatKind>().is_err());
    }

    #[test]
    fn stat_kind_serializes_snake_case() {
        let json = serde_json::to_string(&StatKind::Channel).unwrap();
        assert_eq!(json, "\"channel\"");
    }

    #[test]
    fn ranked_total_converts_to_hours() {
        let row = RankedTotal::new("c1", 5_400_000);
        assert!((row.hours() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn open_session_detection() {
        let mut session = ChannelUserSession {
            channel_id: "c".into(),
            user_id: "u".into(),
            total_time_ms: 0,
            last_join: Some(10),
        };
        assert!(session.is_open());
        session.last_join = None;
        assert!(!session.is_open());
    }
}
