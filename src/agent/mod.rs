//! The tool-calling agent.
//!
//! [`Agent`] drives one query as an explicit state machine: ask the model,
//! run the tools it requests (in order, through the cache), feed the results
//! back, and stop when the model answers without tool calls. Every run is
//! bounded by a round budget, an optional wall-clock deadline and a
//! cancellation token.

mod batch;
mod runner;

pub use batch::{run_batch, BatchReport, QueryOutcome};
pub use runner::{Agent, AgentResponse, RunOptions, ToolCallRecord, DEFAULT_MAX_ROUNDS};

#[cfg(test)]
pub(crate) use runner::test_models;
