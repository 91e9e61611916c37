//! ytagent - ask questions about YouTube videos
//!
//! A tool-calling agent: a chat model decides which YouTube tools to call
//! (search, transcripts, metadata, trending, thumbnails), the results are fed
//! back into the conversation, and the loop ends when the model answers.
//!
//! # Architecture
//!
//! - `config` - Configuration management and the system prompt
//! - `conversation` - Ordered, append-only message history of one run
//! - `tools` - Closed tool registry and yt-dlp backed tool execution
//! - `cache` - TTL cache for tool results (memory or SQLite backend)
//! - `model` - Chat model adapters (OpenAI-compatible providers)
//! - `agent` - The tool-calling state machine and batch mode
//! - `service` - Ready-to-use service used by the CLI and HTTP server
//!
//! # Example
//!
//! ```rust,no_run
//! use ytagent::agent::RunOptions;
//! use ytagent::config::Settings;
//! use ytagent::service::AgentService;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let service = AgentService::from_settings(&settings)?;
//!
//!     let result = service
//!         .process_query("Summarize https://youtu.be/dQw4w9WgXcQ", &RunOptions::default())
//!         .await?;
//!     println!("{}", result.response);
//!
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cache;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
pub mod model;
pub mod service;
pub mod tools;

pub use error::{Result, YtAgentError};
