//! Log Redaction
//!
//! Scrubs Discord bot tokens and bearer credentials from strings prior to logging.

use regex::Regex;
use std::sync::LazyLock;

/// Bot tokens are three base64url segments joined by dots.
static BOT_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w-]{24,}\.[\w-]{6}\.[\w-]{27,}").expect("valid token regex"));
static BEARER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bBearer\s+[a-zA-Z0-9\-\._~+/]+=*").expect("valid bearer regex")
});

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = BEARER_RE.replace_all(input, "Bearer [REDACTED_TOKEN]");
    BOT_TOKEN_RE
        .replace_all(&redacted, "[REDACTED_TOKEN]")
        .into_owned()
}
