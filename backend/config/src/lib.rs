//! `voicetally-config`: runtime configuration for the voice tracker.
//!
//! Provides:
//! - Typed config schema with defaults for every section
//! - YAML loading from `~/.voicetally/config.yaml` or `VOICETALLY_CONFIG`
//! - `${ENV_VAR}` substitution and well-known env overrides
//! - Config redaction for safe logging/display
//! - Validation with path-qualified messages

pub mod env;
pub mod io;
pub mod redact;
pub mod schema;
pub mod validation;

pub use env::{
    apply_env_overrides, apply_env_overrides_with, resolve_env_vars, resolve_env_vars_with,
    MissingEnvVarError,
};
pub use io::{config_dir, config_file_path, default_config_path, load_raw_config};
pub use redact::{redact, redacted_config};
pub use schema::{
    DiscordConfig, HttpConfig, LoggingConfig, ReportsConfig, RetryConfig, StorageConfig,
    VoiceTallyConfig,
};
pub use validation::{
    is_supported_locale, validate, ConfigValidationError, ValidationReport, LOCALE_TAGS,
};

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Load, substitute env vars, apply env overrides, and validate a config file.
///
/// This is the main entry point for loading a config at runtime. Validation
/// errors fail the load. Warnings are left to [`log_config_warnings`], which
/// callers run once the logger is installed.
pub async fn load_and_prepare(path: &Path) -> Result<VoiceTallyConfig> {
    let env: HashMap<String, String> = std::env::vars().collect();
    load_and_prepare_with(path, &env).await
}

/// [`load_and_prepare`] against an explicit environment.
pub async fn load_and_prepare_with(
    path: &Path,
    env: &HashMap<String, String>,
) -> Result<VoiceTallyConfig> {
    let value = load_raw_config(path).await?;

    let value = resolve_env_vars_with(&value, env).context("Failed to resolve env vars in config")?;

    let config: VoiceTallyConfig = serde_json::from_value(value)
        .with_context(|| format!("Invalid config at: {}", path.display()))?;

    let config = apply_env_overrides_with(config, env);

    let report = validate(&config);
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
    if let Some(first) = report.errors.first() {
        bail!("{} config error(s); first: {first}", report.errors.len());
    }

    Ok(config)
}

/// Log every validation warning for `config` and return how many there were.
pub fn log_config_warnings(config: &VoiceTallyConfig) -> usize {
    let report = validate(config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    report.warnings.len()
}
