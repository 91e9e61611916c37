//! Conversation state for one agent run.
//!
//! A [`Conversation`] always starts with a system turn followed by the human
//! query, and only ever grows. Tool results are accepted only for call ids
//! requested by the most recent assistant turn, one result per request (a
//! turn that repeats an id gets one result per repetition), and the next
//! assistant turn is accepted only after every request has been answered.

use crate::error::{Result, YtAgentError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A model-issued request to invoke a named tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Identifier the tool result must echo back.
    pub id: String,
    /// Registered tool name.
    pub name: String,
    /// Named arguments.
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One assistant reply: text, tool-call requests, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantTurn {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl AssistantTurn {
    /// A final answer with no tool calls.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// A turn that only requests tools.
    pub fn tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// One turn of the dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System { content: String },
    Human { content: String },
    Assistant(AssistantTurn),
    ToolResult { call_id: String, content: String },
}

impl Message {
    /// Role name as shown in logs and traces.
    pub fn role(&self) -> &'static str {
        match self {
            Message::System { .. } => "system",
            Message::Human { .. } => "human",
            Message::Assistant(_) => "assistant",
            Message::ToolResult { .. } => "tool",
        }
    }

    /// Text content, if the turn has any.
    pub fn content(&self) -> Option<&str> {
        match self {
            Message::System { content }
            | Message::Human { content }
            | Message::ToolResult { content, .. } => Some(content),
            Message::Assistant(turn) => turn.content.as_deref(),
        }
    }
}

/// Ordered, append-only message sequence owned by a single run.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    messages: Vec<Message>,
    /// Ids requested by the latest assistant turn.
    #[serde(skip)]
    requested_calls: Vec<String>,
    /// Requested ids still waiting for a result, with repeats.
    #[serde(skip)]
    pending_calls: Vec<String>,
}

impl Conversation {
    /// Start a conversation with the system prompt and the user's query.
    pub fn seed(system_prompt: &str, query: &str) -> Self {
        Self {
            messages: vec![
                Message::System {
                    content: system_prompt.to_string(),
                },
                Message::Human {
                    content: query.to_string(),
                },
            ],
            requested_calls: Vec::new(),
            pending_calls: Vec::new(),
        }
    }

    /// Append a message, enforcing turn ordering.
    pub fn append(&mut self, message: Message) -> Result<()> {
        match &message {
            Message::System { .. } | Message::Human { .. } => {
                return Err(YtAgentError::Conversation(format!(
                    "{} turns are only allowed when seeding",
                    message.role()
                )));
            }
            Message::Assistant(turn) => {
                if let Some(missing) = self.pending_calls.first() {
                    return Err(YtAgentError::Conversation(format!(
                        "tool call {} has no result yet",
                        missing
                    )));
                }
                self.requested_calls = turn.tool_calls.iter().map(|c| c.id.clone()).collect();
                self.pending_calls = self.requested_calls.clone();
            }
            Message::ToolResult { call_id, .. } => {
                match self.pending_calls.iter().position(|id| id == call_id) {
                    Some(index) => {
                        self.pending_calls.remove(index);
                    }
                    None if self.requested_calls.contains(call_id) => {
                        return Err(YtAgentError::Conversation(format!(
                            "tool call {} already answered",
                            call_id
                        )));
                    }
                    None => {
                        return Err(YtAgentError::Conversation(format!(
                            "tool result for unknown call id {}",
                            call_id
                        )));
                    }
                }
            }
        }

        self.messages.push(message);
        Ok(())
    }

    /// Append an assistant turn.
    pub fn push_assistant(&mut self, turn: AssistantTurn) -> Result<()> {
        self.append(Message::Assistant(turn))
    }

    /// Append the result of a tool call.
    pub fn push_tool_result(&mut self, call_id: &str, content: String) -> Result<()> {
        self.append(Message::ToolResult {
            call_id: call_id.to_string(),
            content,
        })
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}
