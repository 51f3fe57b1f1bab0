use thiserror::Error;

/// Top-level error type for the voicetally runtime.
#[derive(Debug, Error)]
pub enum VoiceTallyError {
    /// A read or write against the session store or channel registry failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A display-name lookup against the chat platform failed.
    #[error("lookup failed for {kind} {id}: {message}")]
    Lookup {
        kind: String,
        id: String,
        message: String,
    },

    #[error("chart rendering failed: {0}")]
    Render(String),

    #[error("operation timed out after {0} ms")]
    Timeout(u64),

    #[error("invalid presence event: {0}")]
    InvalidEvent(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VoiceTallyError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    /// True for failures on the accounting path, which must reach an operator.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

pub type Result<T, E = VoiceTallyError> = std::result::Result<T, E>;
