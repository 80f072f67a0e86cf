use thiserror::Error;

/// Typed error hierarchy for hostbridge.
///
/// Use at module boundaries (provider calls, config validation, mailbox I/O).
/// Internal/leaf functions can continue using `anyhow::Result`; the `Internal` variant
/// allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum HostbridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(String),

    /// Rate-limit-class rejection (HTTP 429, or 413 when the upstream meters tokens per minute).
    #[error("Rate limit exceeded (status {status})")]
    RateLimit {
        status: u16,
        retry_after: Option<u64>,
    },

    /// The upstream rejected its own tool call as malformed. `body` is the raw error payload.
    #[error("Model produced a malformed tool call")]
    MalformedToolCall { body: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HostbridgeError {
    /// Whether the agent loop should retry the completion call.
    ///
    /// Only rate-limit-class responses qualify; everything else is terminal
    /// for the invocation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit { .. })
    }

    /// Server-requested wait in seconds, when the upstream sent one.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
