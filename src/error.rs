use reqwest::StatusCode;

/// Why a single completion call produced no usable content.
///
/// The retry policy treats every variant the same way; the distinction only
/// shows up in logs.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("request error ({kind}): {source}")]
    Transport {
        kind: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("completion endpoint returned {0}")]
    Status(StatusCode),

    #[error("stream ended without message content")]
    EmptyContent,

    #[error("content too short: {chars} chars, need {required}")]
    ShortContent { chars: usize, required: usize },
}

impl CompletionError {
    /// Short label used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            CompletionError::Transport { kind, .. } => kind,
            CompletionError::Status(_) => "status",
            CompletionError::EmptyContent => "empty",
            CompletionError::ShortContent { .. } => "short",
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connection"
        } else if e.is_body() || e.is_decode() {
            "body"
        } else {
            "other"
        };
        CompletionError::Transport { kind, source: e }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("unknown preset: {0}")]
    UnknownPreset(String),

    #[error("unknown user variant: {0}")]
    UnknownVariant(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("batch semaphore closed: {0}")]
    Semaphore(#[from] tokio::sync::AcquireError),

    #[error("batch task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
