//! Config validation with user-friendly error messages.

use thiserror::Error;

use crate::schema::VoiceTallyConfig;

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// A collection of validation errors found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Locale tags accepted for `reports.locale`, compared case-insensitively.
pub const LOCALE_TAGS: &[&str] = &["ja", "ja-jp", "en", "en-us", "en-gb"];

pub fn is_supported_locale(tag: &str) -> bool {
    LOCALE_TAGS.contains(&tag.trim().to_ascii_lowercase().as_str())
}

/// Validate the config and return a report of all errors and warnings.
///
/// A missing bot token is only a warning here: offline commands work without it,
/// and `serve` checks for it separately.
pub fn validate(config: &VoiceTallyConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_discord(config, &mut report);
    validate_storage(config, &mut report);
    validate_http(config, &mut report);
    validate_reports(config, &mut report);
    validate_retry(config, &mut report);
    report
}

fn validate_discord(config: &VoiceTallyConfig, report: &mut ValidationReport) {
    match config.discord.token.as_deref().map(str::trim) {
        None | Some("") => report.warn("discord.token", "No bot token configured"),
        Some(token) if token.split('.').count() != 3 => {
            report.warn("discord.token", "Token does not look like a Discord bot token")
        }
        Some(_) => {}
    }
}

fn validate_storage(config: &VoiceTallyConfig, report: &mut ValidationReport) {
    if config.storage.db_path.trim().is_empty() {
        report.error("storage.db_path", "Database path cannot be empty");
    }
}

fn validate_http(config: &VoiceTallyConfig, report: &mut ValidationReport) {
    if !config.http.enabled {
        return;
    }
    if config.http.port == 0 {
        report.error("http.port", "Port must be between 1 and 65535");
    }
    if config.http.bind_address.trim().is_empty() {
        report.error("http.bind_address", "Bind address cannot be empty");
    }
}

fn validate_reports(config: &VoiceTallyConfig, report: &mut ValidationReport) {
    if config.reports.limit == 0 {
        report.error("reports.limit", "Limit must be at least 1");
    } else if config.reports.limit > 25 {
        report.warn("reports.limit", "Charts with more than 25 bars are hard to read");
    }
    if config.reports.query_timeout_ms == 0 {
        report.error("reports.query_timeout_ms", "Query timeout must be positive");
    }
    if !is_supported_locale(&config.reports.locale) {
        report.error(
            "reports.locale",
            format!("Unsupported locale '{}'; expected ja or en", config.reports.locale),
        );
    }
    if let Some(path) = config.reports.font_path.as_deref() {
        if !std::path::Path::new(path).is_file() {
            report.warn("reports.font_path", format!("Font file '{path}' not found; system fonts will be used"));
        }
    }
}

fn validate_retry(config: &VoiceTallyConfig, report: &mut ValidationReport) {
    if config.retry.max_attempts == 0 {
        report.error("retry.max_attempts", "At least one attempt is required");
    }
    if config.retry.max_delay_ms < config.retry.base_delay_ms {
        report.warn("retry.max_delay_ms", "Max delay is below the base delay");
    }
}
