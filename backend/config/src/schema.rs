//! voicetally runtime configuration schema.
//!
//! Every section is optional in the YAML file; missing fields take the
//! defaults below.

use serde::{Deserialize, Serialize};

/// Default HTTP listener port.
pub const DEFAULT_HTTP_PORT: u16 = 3002;

/// Default SQLite database file.
pub const DEFAULT_DB_PATH: &str = "voice_channel_time.db";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceTallyConfig {
    pub discord: DiscordConfig,
    pub storage: StorageConfig,
    pub http: HttpConfig,
    pub reports: ReportsConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token; usually `${DISCORD_BOT_TOKEN}`.
    pub token: Option<String>,
    pub application_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_HTTP_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    /// Rows per ranking.
    pub limit: usize,
    /// Upper bound for one aggregation query.
    pub query_timeout_ms: u64,
    /// Reply language: `ja` or `en`.
    pub locale: String,
    /// TrueType/OpenType font for chart text; system fonts are searched when unset.
    pub font_path: Option<String>,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            query_timeout_ms: 5_000,
            locale: "ja".to_string(),
            font_path: None,
        }
    }
}

/// Retry of interaction acknowledgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory for daily-rolling log files; console only when unset.
    pub dir: Option<String>,
    /// JSON console output instead of human-readable lines.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            json: false,
        }
    }
}
