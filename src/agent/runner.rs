//! Agent runner: the tool-calling loop.

use crate::config::SYSTEM_PROMPT;
use crate::conversation::{Conversation, ToolCallRequest};
use crate::error::{Result, YtAgentError};
use crate::model::ChatModel;
use crate::tools::{ToolContext, ToolRegistry};
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of model rounds per query.
pub const DEFAULT_MAX_ROUNDS: usize = 15;

/// Per-run options.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Route cacheable tool calls through the cache.
    pub use_cache: bool,
    /// Cancels the run at the next step or during an in-flight call.
    pub cancel: CancellationToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            cancel: CancellationToken::new(),
        }
    }
}

impl RunOptions {
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Where the loop is.
#[derive(Debug)]
enum State {
    AwaitingModel,
    ExecutingTools(Vec<ToolCallRequest>),
    Terminal(String),
}

/// Agent that answers a query by letting the model call tools until it is done.
pub struct Agent {
    model: Arc<dyn ChatModel>,
    registry: ToolRegistry,
    tools: Arc<ToolContext>,
    max_rounds: usize,
    timeout: Option<Duration>,
    system_prompt: String,
}

impl Agent {
    /// Create an agent over a model and a tool context.
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<ToolContext>) -> Self {
        Self {
            model,
            registry: ToolRegistry::new(),
            tools,
            max_rounds: DEFAULT_MAX_ROUNDS,
            timeout: None,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }

    /// Set a custom system prompt.
    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    /// Set the maximum number of model rounds.
    pub fn with_max_rounds(mut self, max: usize) -> Self {
        self.max_rounds = max;
        self
    }

    /// Set the wall-clock budget for a whole run.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &dyn ChatModel {
        self.model.as_ref()
    }

    /// Run the agent on `query` with default options.
    pub async fn run(&self, query: &str) -> Result<AgentResponse> {
        self.run_with(query, &RunOptions::default()).await
    }

    /// Run the agent on `query`.
    pub async fn run_with(&self, query: &str, options: &RunOptions) -> Result<AgentResponse> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut conversation = Conversation::seed(&self.system_prompt, query);
        let mut tool_calls = Vec::new();
        let mut rounds = 0;
        let mut state = State::AwaitingModel;

        let content = loop {
            state = match state {
                State::Terminal(content) => break content,
                State::AwaitingModel => {
                    self.checkpoint(options, deadline)?;

                    if rounds >= self.max_rounds {
                        return Err(YtAgentError::LoopBudgetExceeded {
                            max_rounds: self.max_rounds,
                        });
                    }
                    rounds += 1;
                    debug!("Agent round {}", rounds);

                    let turn = self
                        .interruptible(self.model.invoke(&conversation), options, deadline)
                        .await??;

                    let next = if turn.has_tool_calls() {
                        State::ExecutingTools(turn.tool_calls.clone())
                    } else {
                        State::Terminal(turn.content.clone().unwrap_or_default())
                    };
                    conversation.push_assistant(turn)?;
                    next
                }
                State::ExecutingTools(calls) => {
                    for call in &calls {
                        self.checkpoint(options, deadline)?;

                        let record = self.execute_tool_call(call, options, deadline).await?;
                        conversation.push_tool_result(&call.id, record.result.clone())?;
                        tool_calls.push(record);
                    }
                    State::AwaitingModel
                }
            };
        };

        info!(
            "Agent finished after {} rounds and {} tool calls",
            rounds,
            tool_calls.len()
        );

        Ok(AgentResponse {
            content,
            conversation,
            tool_calls,
            rounds,
        })
    }

    /// Execute a single tool call and return a record of it.
    ///
    /// Tool failures become `Error: ...` results. Unknown tools, cancellation
    /// and timeouts end the run.
    async fn execute_tool_call(
        &self,
        call: &ToolCallRequest,
        options: &RunOptions,
        deadline: Option<Instant>,
    ) -> Result<ToolCallRecord> {
        let kind = self.registry.resolve(&call.name)?;

        let shown_args = Value::Object(call.arguments.clone());
        info!("Agent calling tool: {} with args: {}", kind, shown_args);

        let outcome = self
            .interruptible(self.tools.call(kind, &call.arguments, options.use_cache), options, deadline)
            .await?;

        let (result, is_error) = match outcome {
            Ok(output) => (output, false),
            Err(e) => {
                warn!("Tool {} failed: {}", kind, e);
                (format!("Error: {}", e.tool_message()), true)
            }
        };

        Ok(ToolCallRecord {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            result,
            is_error,
        })
    }

    fn checkpoint(&self, options: &RunOptions, deadline: Option<Instant>) -> Result<()> {
        if options.cancel.is_cancelled() {
            return Err(YtAgentError::Cancelled);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(self.timeout_error());
        }
        Ok(())
    }

    /// Await `fut` unless the run is cancelled or the deadline passes first.
    async fn interruptible<F: Future>(
        &self,
        fut: F,
        options: &RunOptions,
        deadline: Option<Instant>,
    ) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = options.cancel.cancelled() => Err(YtAgentError::Cancelled),
            _ = wait_until(deadline) => Err(self.timeout_error()),
            output = fut => Ok(output),
        }
    }

    fn timeout_error(&self) -> YtAgentError {
        YtAgentError::Timeout(self.timeout.unwrap_or_default())
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Response from an agent run.
#[derive(Debug, Serialize)]
pub struct AgentResponse {
    /// The final response content from the agent.
    pub content: String,
    /// Full message history of the run.
    pub conversation: Conversation,
    /// Record of all tool calls made during execution.
    pub tool_calls: Vec<ToolCallRecord>,
    /// Number of model rounds used.
    pub rounds: usize,
}

/// Record of a tool call made by the agent.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub id: String,
    /// Name of the tool called.
    pub name: String,
    /// Arguments passed to the tool.
    pub arguments: Map<String, Value>,
    /// Result returned by the tool, or `Error: ...`.
    pub result: String,
    pub is_error: bool,
}

impl std::fmt::Display for ToolCallRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, Value::Object(self.arguments.clone()))
    }
}
