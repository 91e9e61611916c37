//! Tool registry and execution for the agent.
//!
//! The tool set is closed: [`ToolKind`] enumerates every capability, the
//! [`ToolRegistry`] resolves model-supplied names against it and advertises
//! the same set to the model, and [`ToolContext`] runs a resolved call,
//! routing cacheable categories through the [`ToolCache`].

mod text;
mod youtube;

pub use text::{extract_video_id, normalize_region_code, normalize_video_url, truncate_text};
pub use youtube::{
    parse_json3_transcript, Chapter, SearchHit, Thumbnail, TrendingVideo, VideoMetadata,
    YoutubeProvider, YtDlp,
};

#[cfg(test)]
pub use youtube::MockYoutubeProvider;

use crate::cache::{CacheKey, ToolCache};
use crate::config::CacheTtlSettings;
use crate::error::{Result, YtAgentError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Every tool the agent can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ExtractVideoId,
    FetchTranscript,
    SearchYoutube,
    GetFullMetadata,
    GetTrendingVideos,
    GetThumbnails,
    TruncateText,
}

/// Cache lifetime class of a tool's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    Search,
    Transcript,
    Metadata,
    Thumbnails,
    /// Cheap, local, or too volatile to cache.
    Uncached,
}

impl ToolCategory {
    /// TTL for this category, or `None` when results are never cached.
    pub fn ttl(&self, ttl: &CacheTtlSettings) -> Option<Duration> {
        let secs = match self {
            ToolCategory::Search => ttl.search_secs,
            ToolCategory::Transcript => ttl.transcript_secs,
            ToolCategory::Metadata => ttl.metadata_secs,
            ToolCategory::Thumbnails => ttl.thumbnails_secs,
            ToolCategory::Uncached => return None,
        };
        Some(Duration::from_secs(secs))
    }
}

impl ToolKind {
    pub const ALL: [ToolKind; 7] = [
        ToolKind::ExtractVideoId,
        ToolKind::FetchTranscript,
        ToolKind::SearchYoutube,
        ToolKind::GetFullMetadata,
        ToolKind::GetTrendingVideos,
        ToolKind::GetThumbnails,
        ToolKind::TruncateText,
    ];

    /// Name the model uses to call this tool.
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::ExtractVideoId => "extract_video_id",
            ToolKind::FetchTranscript => "fetch_transcript",
            ToolKind::SearchYoutube => "search_youtube",
            ToolKind::GetFullMetadata => "get_full_metadata",
            ToolKind::GetTrendingVideos => "get_trending_videos",
            ToolKind::GetThumbnails => "get_thumbnails",
            ToolKind::TruncateText => "truncate_text",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn category(&self) -> ToolCategory {
        match self {
            ToolKind::SearchYoutube => ToolCategory::Search,
            ToolKind::FetchTranscript => ToolCategory::Transcript,
            ToolKind::GetFullMetadata => ToolCategory::Metadata,
            ToolKind::GetThumbnails => ToolCategory::Thumbnails,
            ToolKind::ExtractVideoId | ToolKind::GetTrendingVideos | ToolKind::TruncateText => {
                ToolCategory::Uncached
            }
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::ExtractVideoId => {
                "Extract the 11-character YouTube video ID from a URL. \
                Supports watch, youtu.be and embed formats."
            }
            ToolKind::FetchTranscript => {
                "Fetch the transcript of a YouTube video as plain text. \
                Use this for summaries or questions about what is said in a video."
            }
            ToolKind::SearchYoutube => {
                "Search YouTube for videos matching a query. \
                Returns a list of results with title, video_id and url."
            }
            ToolKind::GetFullMetadata => {
                "Get detailed metadata for a YouTube video without downloading it: \
                title, views, duration, channel, likes, comments and chapters."
            }
            ToolKind::GetTrendingVideos => {
                "Fetch currently trending videos for a region (two-letter country code). \
                The trending feed may be restricted; fall back to search_youtube if it fails."
            }
            ToolKind::GetThumbnails => "Retrieve the available thumbnails for a YouTube video.",
            ToolKind::TruncateText => {
                "Truncate a large block of text to a maximum number of characters."
            }
        }
    }

    /// JSON schema of the tool's parameters.
    pub fn parameters(&self) -> Value {
        match self {
            ToolKind::ExtractVideoId => serde_json::json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "YouTube video URL" }
                },
                "required": ["url"]
            }),
            ToolKind::FetchTranscript => serde_json::json!({
                "type": "object",
                "properties": {
                    "video_id": {
                        "type": "string",
                        "description": "The YouTube video ID (e.g. dQw4w9WgXcQ)"
                    },
                    "language": {
                        "type": "string",
                        "description": "Transcript language code (default: en)",
                        "default": "en"
                    }
                },
                "required": ["video_id"]
            }),
            ToolKind::SearchYoutube => serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "The search term" }
                },
                "required": ["query"]
            }),
            ToolKind::GetFullMetadata | ToolKind::GetThumbnails => serde_json::json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "YouTube video URL or ID" }
                },
                "required": ["url"]
            }),
            ToolKind::GetTrendingVideos => serde_json::json!({
                "type": "object",
                "properties": {
                    "region_code": {
                        "type": "string",
                        "description": "Two-letter country code, e.g. US"
                    }
                },
                "required": ["region_code"]
            }),
            ToolKind::TruncateText => serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "Text to truncate" },
                    "max_chars": {
                        "type": "integer",
                        "description": "Maximum characters to keep (default: 3000)",
                        "default": 3000
                    }
                },
                "required": ["text"]
            }),
        }
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Capability advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Fixed name-to-tool mapping used for both dispatch and advertisement.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolKind>,
}

impl ToolRegistry {
    /// Registry with every tool.
    pub fn new() -> Self {
        Self {
            tools: ToolKind::ALL.to_vec(),
        }
    }

    /// Resolve a tool name.
    ///
    /// Unknown names mean the model was offered a different set than the one
    /// being dispatched, which is a contract violation.
    pub fn resolve(&self, name: &str) -> Result<ToolKind> {
        ToolKind::from_name(name)
            .filter(|kind| self.tools.contains(kind))
            .ok_or_else(|| YtAgentError::UnknownTool(name.to_string()))
    }

    /// Name, parameter schema and description of every registered tool.
    pub fn list_capabilities(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(ToolKind::spec).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn default_language() -> String {
    "en".to_string()
}

fn default_max_chars() -> usize {
    3000
}

/// A tool call with typed, defaulted arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ToolInvocation {
    ExtractVideoId {
        url: String,
    },
    FetchTranscript {
        video_id: String,
        #[serde(default = "default_language")]
        language: String,
    },
    SearchYoutube {
        query: String,
    },
    GetFullMetadata {
        url: String,
    },
    GetTrendingVideos {
        region_code: String,
    },
    GetThumbnails {
        url: String,
    },
    TruncateText {
        text: String,
        #[serde(default = "default_max_chars")]
        max_chars: usize,
    },
}

impl ToolInvocation {
    /// Parse the model's argument map for `kind`.
    pub fn parse(kind: ToolKind, arguments: &Map<String, Value>) -> Result<Self> {
        let tagged = serde_json::json!({
            "name": kind.name(),
            "arguments": Value::Object(arguments.clone()),
        });

        serde_json::from_value(tagged).map_err(|e| {
            YtAgentError::tool(kind.name(), format!("Invalid arguments for {}: {}", kind.name(), e))
        })
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            ToolInvocation::ExtractVideoId { .. } => ToolKind::ExtractVideoId,
            ToolInvocation::FetchTranscript { .. } => ToolKind::FetchTranscript,
            ToolInvocation::SearchYoutube { .. } => ToolKind::SearchYoutube,
            ToolInvocation::GetFullMetadata { .. } => ToolKind::GetFullMetadata,
            ToolInvocation::GetTrendingVideos { .. } => ToolKind::GetTrendingVideos,
            ToolInvocation::GetThumbnails { .. } => ToolKind::GetThumbnails,
            ToolInvocation::TruncateText { .. } => ToolKind::TruncateText,
        }
    }

    /// Arguments after defaults were applied.
    pub fn arguments(&self) -> Map<String, Value> {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("arguments").map(Value::take))
            .and_then(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Cache key identifying this call.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::derive(self.kind().name(), &self.arguments())
    }
}

/// Everything needed to run a tool call.
pub struct ToolContext {
    youtube: Arc<dyn YoutubeProvider>,
    cache: Option<ToolCache>,
    ttl: CacheTtlSettings,
}

impl ToolContext {
    /// Create a tool context. Pass `None` to disable caching entirely.
    pub fn new(youtube: Arc<dyn YoutubeProvider>, cache: Option<ToolCache>, ttl: CacheTtlSettings) -> Self {
        Self { youtube, cache, ttl }
    }

    pub fn cache(&self) -> Option<&ToolCache> {
        self.cache.as_ref()
    }

    /// Run a resolved tool with the model's arguments and return its output as text.
    ///
    /// Cacheable categories go through the cache unless `use_cache` is false.
    pub async fn call(&self, kind: ToolKind, arguments: &Map<String, Value>, use_cache: bool) -> Result<String> {
        let invocation = ToolInvocation::parse(kind, arguments)?;

        let ttl = kind.category().ttl(&self.ttl);
        match (&self.cache, ttl) {
            (Some(cache), Some(ttl)) if use_cache => {
                let key = invocation.cache_key();
                cache
                    .get_or_compute(&key, ttl, || self.execute(&invocation))
                    .await
            }
            _ => self.execute(&invocation).await,
        }
    }

    /// Execute a tool without consulting the cache.
    pub async fn execute(&self, invocation: &ToolInvocation) -> Result<String> {
        info!("Executing tool {}", invocation.kind());

        match invocation {
            ToolInvocation::ExtractVideoId { url } => extract_video_id(url),
            ToolInvocation::TruncateText { text, max_chars } => Ok(truncate_text(text, *max_chars)),
            ToolInvocation::FetchTranscript { video_id, language } => {
                self.youtube.transcript(video_id, language).await
            }
            ToolInvocation::SearchYoutube { query } => {
                let hits = self.youtube.search(query).await?;
                debug!("Search returned {} results", hits.len());
                Ok(serde_json::to_string(&hits)?)
            }
            ToolInvocation::GetFullMetadata { url } => {
                let url = normalize_video_url(url)?;
                let metadata = self.youtube.metadata(&url).await?;
                Ok(serde_json::to_string(&metadata)?)
            }
            ToolInvocation::GetTrendingVideos { region_code } => {
                let region = normalize_region_code(region_code)?;
                self.trending(&region).await
            }
            ToolInvocation::GetThumbnails { url } => {
                let url = normalize_video_url(url)?;
                let thumbnails = self
                    .youtube
                    .thumbnails(&url)
                    .await
                    .map_err(|e| YtAgentError::tool("get_thumbnails", format!("Failed to get thumbnails: {}", e.tool_message())))?;
                Ok(serde_json::to_string(&thumbnails)?)
            }
        }
    }

    async fn trending(&self, region: &str) -> Result<String> {
        const FALLBACK: &str = "Use search_youtube('trending videos') as an alternative.";

        match self.youtube.trending(region).await {
            Ok(videos) if videos.is_empty() => Err(YtAgentError::tool(
                "get_trending_videos",
                format!(
                    "No trending videos found. YouTube may restrict access to the trending feed. {}",
                    FALLBACK
                ),
            )),
            Ok(videos) => Ok(serde_json::to_string(&videos)?),
            Err(e) => Err(YtAgentError::tool(
                "get_trending_videos",
                format!("Failed to fetch trending videos: {}. {}", e.tool_message(), FALLBACK),
            )),
        }
    }
}
