//! Configuration settings for ytagent.

use crate::error::{Result, YtAgentError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub llm: LlmSettings,
    pub agent: AgentSettings,
    pub cache: CacheSettings,
    pub server: ServerSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.ytagent".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Chat model provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Groq cloud (free tier available).
    #[default]
    Groq,
    /// OpenAI.
    OpenAI,
    /// Bytez OpenAI-compatible gateway.
    Bytez,
    /// Cerebras cloud.
    Cerebras,
    /// Local Ollama server.
    Ollama,
}

impl ProviderKind {
    /// OpenAI-compatible endpoint used when no base URL is configured.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Groq => "https://api.groq.com/openai/v1",
            ProviderKind::OpenAI => "https://api.openai.com/v1",
            ProviderKind::Bytez => "https://api.bytez.com/openai/v1",
            ProviderKind::Cerebras => "https://api.cerebras.ai/v1",
            ProviderKind::Ollama => "http://localhost:11434/v1",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Groq => "llama-3.3-70b-versatile",
            ProviderKind::OpenAI => "gpt-4o-mini",
            ProviderKind::Bytez => "gpt-4o-mini",
            ProviderKind::Cerebras => "gpt-oss-120b",
            ProviderKind::Ollama => "llama3.2",
        }
    }

    /// Environment variable holding the API key, if the provider needs one.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Groq => Some("GROQ_API_KEY"),
            ProviderKind::OpenAI => Some("OPENAI_API_KEY"),
            ProviderKind::Bytez => Some("BYTEZ_API_KEY"),
            ProviderKind::Cerebras => Some("CEREBRAS_API_KEY"),
            ProviderKind::Ollama => None,
        }
    }

    /// Where to obtain a key, shown when one is missing.
    fn key_hint(&self) -> &'static str {
        match self {
            ProviderKind::Groq => "Create a free API key at https://console.groq.com/",
            ProviderKind::OpenAI => "Get an API key from https://platform.openai.com/api-keys",
            ProviderKind::Bytez => "Get a free API key from Bytez",
            ProviderKind::Cerebras => "Create or copy your key from the Cerebras Cloud dashboard",
            ProviderKind::Ollama => "",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "groq" => Ok(ProviderKind::Groq),
            "openai" => Ok(ProviderKind::OpenAI),
            "bytez" => Ok(ProviderKind::Bytez),
            "cerebras" => Ok(ProviderKind::Cerebras),
            "ollama" => Ok(ProviderKind::Ollama),
            _ => Err(format!("Unknown LLM provider: {}", s)),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Groq => write!(f, "groq"),
            ProviderKind::OpenAI => write!(f, "openai"),
            ProviderKind::Bytez => write!(f, "bytez"),
            ProviderKind::Cerebras => write!(f, "cerebras"),
            ProviderKind::Ollama => write!(f, "ollama"),
        }
    }
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Provider (groq, openai, bytez, cerebras, ollama).
    pub provider: ProviderKind,
    /// Model name. Empty = provider default.
    pub model: String,
    /// OpenAI-compatible base URL. None = provider default.
    pub base_url: Option<String>,
    /// Override for the environment variable holding the API key.
    pub api_key_env: Option<String>,
    /// Timeout for a single completion request.
    pub request_timeout_secs: u64,
    /// How long to keep retrying a rate-limited request. 0 = fail on the first 429.
    pub rate_limit_retry_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Groq,
            model: String::new(),
            base_url: None,
            api_key_env: None,
            request_timeout_secs: 300,
            rate_limit_retry_secs: 0,
        }
    }
}

impl LlmSettings {
    /// Effective model name.
    pub fn model_name(&self) -> String {
        if self.model.is_empty() {
            self.provider.default_model().to_string()
        } else {
            self.model.clone()
        }
    }

    /// Effective base URL.
    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| self.provider.default_base_url().to_string())
    }

    /// Name of the environment variable holding the API key.
    pub fn key_env(&self) -> Option<String> {
        self.api_key_env
            .clone()
            .or_else(|| self.provider.api_key_env().map(str::to_string))
    }

    /// Resolve the API key from the environment.
    ///
    /// Providers without authentication get an empty key.
    pub fn api_key(&self) -> Result<String> {
        let Some(var) = self.key_env() else {
            return Ok(String::new());
        };

        match std::env::var(&var) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(YtAgentError::Config(format!(
                "{var} not set! {}. Then export it: export {var}='your_key_here' \
                 (or switch llm.provider in the config file)",
                self.provider.key_hint()
            ))),
        }
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Maximum model rounds per query before giving up.
    pub max_rounds: usize,
    /// Wall-clock budget per query in seconds. 0 = no deadline.
    pub timeout_secs: u64,
    /// How many batch queries run at once.
    pub batch_concurrency: usize,
    /// Replacement for the built-in system prompt.
    pub system_prompt: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_rounds: 15,
            timeout_secs: 120,
            batch_concurrency: 1,
            system_prompt: None,
        }
    }
}

impl AgentSettings {
    /// Per-query deadline, if any.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Cache backend selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// Bounded in-process map.
    #[default]
    Memory,
    /// Persistent SQLite file.
    Sqlite,
}

impl std::fmt::Display for CacheBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackendKind::Memory => write!(f, "memory"),
            CacheBackendKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Time-to-live per tool category, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtlSettings {
    /// Search results change frequently.
    pub search_secs: u64,
    /// Transcripts are immutable once published.
    pub transcript_secs: u64,
    /// Metadata (views, likes) drifts slowly.
    pub metadata_secs: u64,
    /// Thumbnails do not change.
    pub thumbnails_secs: u64,
}

impl Default for CacheTtlSettings {
    fn default() -> Self {
        Self {
            search_secs: 1800,
            transcript_secs: 86_400,
            metadata_secs: 3600,
            thumbnails_secs: 86_400,
        }
    }
}

/// Tool result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Enable caching of tool results.
    pub enabled: bool,
    /// Backend (memory, sqlite).
    pub backend: CacheBackendKind,
    /// Maximum number of entries before eviction.
    pub max_entries: usize,
    /// Path to the SQLite cache (for sqlite backend).
    pub sqlite_path: String,
    /// TTL per tool category.
    pub ttl: CacheTtlSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackendKind::Memory,
            max_entries: 1000,
            sqlite_path: "~/.ytagent/cache.db".to_string(),
            ttl: CacheTtlSettings::default(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Origins allowed by CORS.
    pub allowed_origins: Vec<String>,
    /// Allow any origin (overrides `allowed_origins`).
    pub allow_all_origins: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:5173".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            allow_all_origins: false,
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| YtAgentError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ytagent")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite cache path.
    pub fn cache_path(&self) -> PathBuf {
        Self::expand_path(&self.cache.sqlite_path)
    }
}
