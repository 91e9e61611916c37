//! OpenAI-compatible chat completions adapter.
//!
//! Groq, Bytez, Cerebras and Ollama all speak the OpenAI chat completions
//! protocol, so one `async-openai` client pointed at the provider's base URL
//! covers every configured provider.

use super::{classify_message, model_error, ChatModel};
use crate::config::LlmSettings;
use crate::conversation::{AssistantTurn, Conversation, Message, ToolCallRequest};
use crate::error::{ModelErrorKind, Result};
use crate::tools::ToolSpec;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionToolType, CreateChatCompletionRequestArgs, FunctionCall,
    FunctionObject,
};
use async_openai::Client;
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, instrument};

/// Chat model reached through an OpenAI-compatible endpoint.
pub struct OpenAiCompatibleModel {
    client: Client<OpenAIConfig>,
    provider: String,
    model: String,
    tools: Vec<ChatCompletionTool>,
}

impl OpenAiCompatibleModel {
    /// Create an adapter from settings, reading the API key from the environment.
    pub fn new(settings: &LlmSettings, capabilities: &[ToolSpec]) -> Result<Self> {
        let api_key = settings.api_key()?;
        Self::with_api_key(settings, &api_key, capabilities)
    }

    /// Create an adapter with an explicit API key.
    pub fn with_api_key(settings: &LlmSettings, api_key: &str, capabilities: &[ToolSpec]) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        let config = OpenAIConfig::new()
            .with_api_base(settings.base_url())
            .with_api_key(api_key);

        // async-openai retries 429s internally; bound it.
        let backoff = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::from_secs(settings.rate_limit_retry_secs)))
            .build();

        Ok(Self {
            client: Client::with_config(config)
                .with_http_client(http_client)
                .with_backoff(backoff),
            provider: settings.provider.to_string(),
            model: settings.model_name(),
            tools: tool_definitions(capabilities),
        })
    }

    fn request_messages(&self, conversation: &Conversation) -> Result<Vec<ChatCompletionRequestMessage>> {
        conversation
            .messages()
            .iter()
            .map(|message| to_request_message(message).map_err(|e| self.error(ModelErrorKind::Api, e.to_string())))
            .collect()
    }

    fn error(&self, kind: ModelErrorKind, message: impl Into<String>) -> crate::error::YtAgentError {
        model_error(&self.provider, kind, message)
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleModel {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(provider = %self.provider, model = %self.model))]
    async fn invoke(&self, conversation: &Conversation) -> Result<AssistantTurn> {
        let messages = self.request_messages(conversation)?;

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(&self.model).messages(messages);
        if !self.tools.is_empty() {
            request.tools(self.tools.clone());
        }
        let request = request
            .build()
            .map_err(|e| self.error(ModelErrorKind::Api, e.to_string()))?;

        debug!("Sending {} messages", conversation.len());

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| self.error(classify_error(&e), e.to_string()))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| self.error(ModelErrorKind::MalformedResponse, "No response from model"))?;

        normalize_turn(choice.message.content, choice.message.tool_calls)
            .map_err(|e| self.error(ModelErrorKind::MalformedResponse, e))
    }
}

/// Advertise the tool capabilities as OpenAI function tools.
fn tool_definitions(capabilities: &[ToolSpec]) -> Vec<ChatCompletionTool> {
    capabilities
        .iter()
        .map(|spec| ChatCompletionTool {
            r#type: ChatCompletionToolType::Function,
            function: FunctionObject {
                name: spec.name.clone(),
                description: Some(spec.description.clone()),
                parameters: Some(spec.parameters.clone()),
                strict: None,
            },
        })
        .collect()
}

fn to_request_message(message: &Message) -> std::result::Result<ChatCompletionRequestMessage, OpenAIError> {
    let converted: ChatCompletionRequestMessage = match message {
        Message::System { content } => ChatCompletionRequestSystemMessageArgs::default()
            .content(content.clone())
            .build()?
            .into(),
        Message::Human { content } => ChatCompletionRequestUserMessageArgs::default()
            .content(content.clone())
            .build()?
            .into(),
        Message::Assistant(turn) => {
            let mut args = ChatCompletionRequestAssistantMessageArgs::default();
            if let Some(content) = &turn.content {
                args.content(content.clone());
            }
            if turn.has_tool_calls() {
                args.tool_calls(turn.tool_calls.iter().map(to_wire_tool_call).collect::<Vec<_>>());
            }
            args.build()?.into()
        }
        Message::ToolResult { call_id, content } => ChatCompletionRequestToolMessageArgs::default()
            .tool_call_id(call_id.clone())
            .content(content.clone())
            .build()?
            .into(),
    };
    Ok(converted)
}

fn to_wire_tool_call(call: &ToolCallRequest) -> ChatCompletionMessageToolCall {
    ChatCompletionMessageToolCall {
        id: call.id.clone(),
        r#type: ChatCompletionToolType::Function,
        function: FunctionCall {
            name: call.name.clone(),
            arguments: Value::Object(call.arguments.clone()).to_string(),
        },
    }
}

/// Turn a raw response message into an [`AssistantTurn`].
///
/// Empty content is dropped and argument strings are parsed into maps. Calls
/// without an id, or repeating an id already used in the same turn, get a
/// generated one.
fn normalize_turn(
    content: Option<String>,
    tool_calls: Option<Vec<ChatCompletionMessageToolCall>>,
) -> std::result::Result<AssistantTurn, String> {
    let mut seen = HashSet::new();
    let tool_calls = tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let mut call = from_wire_tool_call(call)?;
            if !seen.insert(call.id.clone()) {
                debug!("Replacing repeated tool call id {}", call.id);
                call.id = generated_call_id();
                seen.insert(call.id.clone());
            }
            Ok(call)
        })
        .collect::<std::result::Result<Vec<_>, String>>()?;

    Ok(AssistantTurn {
        content: content.filter(|c| !c.trim().is_empty()),
        tool_calls,
    })
}

fn from_wire_tool_call(call: ChatCompletionMessageToolCall) -> std::result::Result<ToolCallRequest, String> {
    let raw = call.function.arguments.trim();
    let arguments = if raw.is_empty() {
        Map::new()
    } else {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(Value::Null) => Map::new(),
            Ok(other) => {
                return Err(format!(
                    "Arguments for {} are not an object: {}",
                    call.function.name, other
                ))
            }
            Err(e) => {
                return Err(format!(
                    "Arguments for {} are not valid JSON: {}",
                    call.function.name, e
                ))
            }
        }
    };

    let id = if call.id.trim().is_empty() {
        generated_call_id()
    } else {
        call.id
    };

    Ok(ToolCallRequest::new(id, call.function.name, arguments))
}

fn generated_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

fn classify_error(err: &OpenAIError) -> ModelErrorKind {
    match err {
        OpenAIError::Reqwest(e) => match e.status().map(|s| s.as_u16()) {
            Some(429) => ModelErrorKind::RateLimited,
            Some(401) | Some(403) => ModelErrorKind::Authentication,
            _ if e.is_decode() => ModelErrorKind::MalformedResponse,
            _ => ModelErrorKind::Transport,
        },
        OpenAIError::ApiError(api) => classify_message(&api.to_string()),
        OpenAIError::JSONDeserialize(_) => ModelErrorKind::MalformedResponse,
        other => classify_message(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use crate::tools::ToolRegistry;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    /// Serve a chat completions endpoint that always answers 429.
    async fn rate_limited_endpoint() -> String {
        async fn limited() -> (StatusCode, Json<Value>) {
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": {
                        "message": "Rate limit reached for model llama-3.3-70b-versatile",
                        "type": "tokens",
                        "param": null,
                        "code": "rate_limit_exceeded"
                    }
                })),
            )
        }

        let app = Router::new().route("/v1/chat/completions", post(limited));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{}/v1", addr)
    }

    fn wire_call(id: &str, name: &str, arguments: &str) -> ChatCompletionMessageToolCall {
        ChatCompletionMessageToolCall {
            id: id.to_string(),
            r#type: ChatCompletionToolType::Function,
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }

    #[test]
    fn test_adapter_uses_provider_defaults() {
        let settings = LlmSettings {
            provider: ProviderKind::Ollama,
            ..LlmSettings::default()
        };
        let model = OpenAiCompatibleModel::with_api_key(&settings, "", &ToolRegistry::new().list_capabilities())
            .unwrap();

        assert_eq!(model.provider(), "ollama");
        assert_eq!(model.model(), "llama3.2");
        assert_eq!(model.tools.len(), 7);
        assert_eq!(model.tools[0].function.name, "extract_video_id");
    }

    #[test]
    fn test_request_messages_cover_every_role() {
        let settings = LlmSettings::default();
        let model = OpenAiCompatibleModel::with_api_key(&settings, "test", &[]).unwrap();

        let mut conv = Conversation::seed("sys", "what is dQw4w9WgXcQ?");
        let call = ToolCallRequest::new("c1", "extract_video_id", Map::new());
        conv.push_assistant(AssistantTurn::tool_calls(vec![call])).unwrap();
        conv.push_tool_result("c1", "dQw4w9WgXcQ".to_string()).unwrap();

        let messages = model.request_messages(&conv).unwrap();
        assert_eq!(messages.len(), 4);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[1], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(messages[2], ChatCompletionRequestMessage::Assistant(_)));
        assert!(matches!(messages[3], ChatCompletionRequestMessage::Tool(_)));
    }

    #[test]
    fn test_normalize_parses_arguments() {
        let turn = normalize_turn(
            None,
            Some(vec![wire_call(
                "call_1",
                "extract_video_id",
                r#"{"url": "https://youtu.be/dQw4w9WgXcQ"}"#,
            )]),
        )
        .unwrap();

        assert_eq!(turn.content, None);
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].id, "call_1");
        assert_eq!(turn.tool_calls[0].arguments["url"], "https://youtu.be/dQw4w9WgXcQ");
    }

    #[test]
    fn test_normalize_fills_missing_ids() {
        let turn = normalize_turn(Some("  ".to_string()), Some(vec![wire_call("", "search_youtube", "")])).unwrap();
        assert_eq!(turn.content, None);
        assert!(turn.tool_calls[0].id.starts_with("call_"));
        assert!(turn.tool_calls[0].arguments.is_empty());
    }

    #[test]
    fn test_normalize_renames_repeated_ids() {
        let turn = normalize_turn(
            None,
            Some(vec![
                wire_call("call_0", "extract_video_id", r#"{"url": "https://youtu.be/dQw4w9WgXcQ"}"#),
                wire_call("call_0", "get_thumbnails", r#"{"url": "https://youtu.be/dQw4w9WgXcQ"}"#),
            ]),
        )
        .unwrap();

        assert_eq!(turn.tool_calls[0].id, "call_0");
        assert_ne!(turn.tool_calls[1].id, "call_0");
        assert!(turn.tool_calls[1].id.starts_with("call_"));
        assert_eq!(turn.tool_calls[1].name, "get_thumbnails");
    }

    #[test]
    fn test_normalize_rejects_bad_arguments() {
        let err = normalize_turn(None, Some(vec![wire_call("c", "search_youtube", "{query: rust")])).unwrap_err();
        assert!(err.contains("not valid JSON"));

        let err = normalize_turn(None, Some(vec![wire_call("c", "search_youtube", "[1, 2]")])).unwrap_err();
        assert!(err.contains("not an object"));
    }

    #[test]
    fn test_text_answer() {
        let turn = normalize_turn(Some("Here is your summary.".to_string()), None).unwrap();
        assert_eq!(turn, AssistantTurn::text("Here is your summary."));
    }

    #[tokio::test]
    async fn test_rate_limit_surfaces_without_retrying() {
        let settings = LlmSettings {
            base_url: Some(rate_limited_endpoint().await),
            ..LlmSettings::default()
        };
        let model = OpenAiCompatibleModel::with_api_key(&settings, "test", &[]).unwrap();
        let conv = Conversation::seed("sys", "summarize this video");

        let err = tokio::time::timeout(Duration::from_secs(10), model.invoke(&conv))
            .await
            .expect("rate-limited request kept retrying")
            .unwrap_err();

        assert!(err.is_rate_limited());
        assert_eq!(err.status_hint(), 429);
    }

    #[test]
    fn test_classify_deserialize_error() {
        let json_err = serde_json::from_str::<Value>("<html>").unwrap_err();
        assert_eq!(
            classify_error(&OpenAIError::JSONDeserialize(json_err)),
            ModelErrorKind::MalformedResponse
        );
        assert_eq!(
            classify_error(&OpenAIError::InvalidArgument("rate_limit_exceeded".to_string())),
            ModelErrorKind::RateLimited
        );
    }
}
