//! Model adapters.
//!
//! The agent loop only sees [`ChatModel`]: hand it the conversation, get back
//! one assistant turn. Provider differences (endpoints, keys, response
//! framing) stay inside the adapter implementations.

mod openai;

pub use openai::OpenAiCompatibleModel;

use crate::conversation::{AssistantTurn, Conversation};
use crate::error::{ModelErrorKind, Result, YtAgentError};
use async_trait::async_trait;

/// A chat model that may answer with text or request tool calls.
///
/// Implementations bind the tool capability list once at construction.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider name used in logs and error reports.
    fn provider(&self) -> &str;

    /// Model identifier.
    fn model(&self) -> &str;

    /// Produce the next assistant turn for `conversation`.
    async fn invoke(&self, conversation: &Conversation) -> Result<AssistantTurn>;
}

/// Guess the kind of a provider failure from its message text.
///
/// Providers behind OpenAI-compatible gateways rarely agree on error codes,
/// so the message is the most reliable signal available.
pub fn classify_message(message: &str) -> ModelErrorKind {
    let lower = message.to_lowercase();

    if lower.contains("429")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("quota")
        || lower.contains("too many requests")
    {
        ModelErrorKind::RateLimited
    } else if lower.contains("401")
        || lower.contains("403")
        || lower.contains("api key")
        || lower.contains("api_key")
        || lower.contains("unauthorized")
        || lower.contains("authentication")
    {
        ModelErrorKind::Authentication
    } else if lower.contains("<!doctype") || lower.contains("<html") {
        ModelErrorKind::MalformedResponse
    } else {
        ModelErrorKind::Api
    }
}

/// Build a model error for `provider`.
pub fn model_error(provider: &str, kind: ModelErrorKind, message: impl Into<String>) -> YtAgentError {
    YtAgentError::ModelInvocation {
        provider: provider.to_string(),
        kind,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_message() {
        assert_eq!(
            classify_message("Rate limit reached for model llama-3.3-70b"),
            ModelErrorKind::RateLimited
        );
        assert_eq!(classify_message("HTTP 429 Too Many Requests"), ModelErrorKind::RateLimited);
        assert_eq!(classify_message("Invalid API Key"), ModelErrorKind::Authentication);
        assert_eq!(
            classify_message("<!DOCTYPE html><html>Bad gateway</html>"),
            ModelErrorKind::MalformedResponse
        );
        assert_eq!(classify_message("model not found"), ModelErrorKind::Api);
    }

    #[test]
    fn test_model_error_is_rate_limited() {
        let err = model_error("groq", ModelErrorKind::RateLimited, "slow down");
        assert!(err.is_rate_limited());
        assert_eq!(err.status_hint(), 429);
        assert!(err.to_string().contains("groq"));
    }
}
