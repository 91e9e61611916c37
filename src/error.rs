//! Error types for ytagent.

use std::time::Duration;
use thiserror::Error;

/// Classification of a failed model invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelErrorKind {
    /// Quota or rate limit exhausted (HTTP 429 and friends).
    RateLimited,
    /// Missing, invalid or rejected API key.
    Authentication,
    /// The provider answered with something that is not a chat completion
    /// (HTML error pages, broken JSON, empty choices, bad tool arguments).
    MalformedResponse,
    /// Connection, DNS or timeout failures talking to the provider.
    Transport,
    /// Any other error reported by the provider API.
    Api,
}

impl std::fmt::Display for ModelErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelErrorKind::RateLimited => write!(f, "rate limited"),
            ModelErrorKind::Authentication => write!(f, "authentication"),
            ModelErrorKind::MalformedResponse => write!(f, "malformed response"),
            ModelErrorKind::Transport => write!(f, "transport"),
            ModelErrorKind::Api => write!(f, "api"),
        }
    }
}

/// Library-level error type for ytagent operations.
#[derive(Error, Debug)]
pub enum YtAgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{tool} failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Model invocation failed ({provider}, {kind}): {message}")]
    ModelInvocation {
        provider: String,
        kind: ModelErrorKind,
        message: String,
    },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Agent exceeded maximum rounds ({max_rounds})")]
    LoopBudgetExceeded { max_rounds: usize },

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Query was cancelled")]
    Cancelled,

    #[error("Conversation error: {0}")]
    Conversation(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl YtAgentError {
    /// Shorthand for a failed tool call.
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        YtAgentError::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Text shown to the model when a tool call fails.
    ///
    /// Tool failures carry their own message verbatim; anything else uses the
    /// error's display form.
    pub fn tool_message(&self) -> String {
        match self {
            YtAgentError::ToolExecution { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// True when the model provider refused the call because of a rate limit.
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            YtAgentError::ModelInvocation {
                kind: ModelErrorKind::RateLimited,
                ..
            }
        )
    }

    /// Suggested HTTP status code for surfacing this error at a service boundary.
    pub fn status_hint(&self) -> u16 {
        match self {
            YtAgentError::InvalidInput(_) => 400,
            YtAgentError::ModelInvocation {
                kind: ModelErrorKind::RateLimited,
                ..
            } => 429,
            YtAgentError::ModelInvocation {
                kind: ModelErrorKind::Transport,
                ..
            } => 502,
            YtAgentError::Timeout(_) => 504,
            _ => 500,
        }
    }
}

/// Result type alias for ytagent operations.
pub type Result<T> = std::result::Result<T, YtAgentError>;
