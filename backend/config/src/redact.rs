//! Config redaction: safe-to-print config snapshots with secrets masked.

use serde_json::Value;

use crate::schema::VoiceTallyConfig;

static SECRET_KEYS: &[&str] = &["token", "bot_token", "secret", "password", "api_key"];

/// Redact a config JSON value, replacing sensitive fields with a short hint.
pub fn redact(value: &Value) -> Value {
    redact_recursive(value, "")
}

/// Redacted JSON view of a typed config, for `check-config` and startup logs.
pub fn redacted_config(config: &VoiceTallyConfig) -> Value {
    match serde_json::to_value(config) {
        Ok(value) => redact(&value),
        Err(_) => Value::Null,
    }
}

fn is_sensitive_key(key: &str) -> bool {
    SECRET_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

fn mask(s: &str) -> String {
    // Char-based to stay on UTF-8 boundaries.
    if s.chars().count() > 8 {
        format!("{}***", s.chars().take(4).collect::<String>())
    } else {
        "***".to_string()
    }
}

fn redact_recursive(value: &Value, key: &str) -> Value {
    match value {
        Value::String(s) if is_sensitive_key(key) && !s.is_empty() => Value::String(mask(s)),
        Value::Array(arr) => Value::Array(arr.iter().map(|v| redact_recursive(v, key)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), redact_recursive(v, k)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_bot_token() {
        let mut config = VoiceTallyConfig::default();
        config.discord.token = Some("MTIzNDU2Nzg5.GhIjKl.abcdefghijklmnop".to_string());
        let redacted = redacted_config(&config);
        let token = redacted["discord"]["token"].as_str().unwrap();
        assert_eq!(token, "MTIz***");
    }

    #[test]
    fn short_secret_fully_masked() {
        let redacted = redact(&json!({"password": "hunter2"}));
        assert_eq!(redacted["password"], "***");
    }

    #[test]
    fn passthrough_non_sensitive() {
        let redacted = redacted_config(&VoiceTallyConfig::default());
        assert_eq!(redacted["logging"]["level"], "info");
        assert_eq!(redacted["http"]["port"], 3002);
        assert!(redacted["discord"]["token"].is_null());
    }
}
