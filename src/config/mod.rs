//! Configuration module for ytagent.
//!
//! Handles loading application settings and the agent's prompt text.

mod prompts;
mod settings;

pub use prompts::{is_greeting, GREETING_REPLY, SYSTEM_PROMPT};
pub use settings::{
    AgentSettings, CacheBackendKind, CacheSettings, CacheTtlSettings, GeneralSettings,
    LlmSettings, ProviderKind, ServerSettings, Settings,
};
