//! Service layer for ytagent.
//!
//! Wires settings into a ready agent (model adapter, yt-dlp tools, cache) and
//! exposes the four operations every front end uses: single query, batch,
//! cache stats and cache clear.

use crate::agent::{run_batch, Agent, BatchReport, RunOptions, ToolCallRecord};
use crate::cache::{CacheStats, ToolCache};
use crate::config::{is_greeting, Settings, GREETING_REPLY};
use crate::error::{Result, YtAgentError};
use crate::model::{ChatModel, OpenAiCompatibleModel};
use crate::tools::{ToolContext, ToolRegistry, YoutubeProvider, YtDlp};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// Answer to a single query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query: String,
    pub response: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub rounds: usize,
}

/// The agent plus the shared cache, built once and reused for every query.
pub struct AgentService {
    agent: Agent,
    cache: Option<ToolCache>,
    batch_concurrency: usize,
}

impl AgentService {
    /// Build the service from settings: OpenAI-compatible model, yt-dlp tools
    /// and the configured cache backend.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let capabilities = ToolRegistry::new().list_capabilities();
        let model: Arc<dyn ChatModel> = Arc::new(OpenAiCompatibleModel::new(&settings.llm, &capabilities)?);

        let cache = if settings.cache.enabled {
            Some(ToolCache::from_settings(settings)?)
        } else {
            None
        };

        info!(
            "Using {} model {} ({} cache)",
            model.provider(),
            model.model(),
            if cache.is_some() { settings.cache.backend.to_string() } else { "no".to_string() }
        );

        Ok(Self::with_components(model, Arc::new(YtDlp::new()), cache, settings))
    }

    /// Build the service from explicit components.
    pub fn with_components(
        model: Arc<dyn ChatModel>,
        youtube: Arc<dyn YoutubeProvider>,
        cache: Option<ToolCache>,
        settings: &Settings,
    ) -> Self {
        let tools = Arc::new(ToolContext::new(youtube, cache.clone(), settings.cache.ttl.clone()));

        let mut agent = Agent::new(model, tools)
            .with_max_rounds(settings.agent.max_rounds)
            .with_timeout(settings.agent.timeout());
        if let Some(prompt) = settings.agent.system_prompt.as_deref() {
            agent = agent.with_system_prompt(prompt);
        }

        Self {
            agent,
            cache,
            batch_concurrency: settings.agent.batch_concurrency.max(1),
        }
    }

    /// Provider name of the underlying model.
    pub fn provider(&self) -> &str {
        self.agent.model().provider()
    }

    /// Answer one query.
    ///
    /// Bare greetings are answered directly without calling the model.
    #[instrument(skip(self, options))]
    pub async fn process_query(&self, query: &str, options: &RunOptions) -> Result<QueryResult> {
        if query.trim().is_empty() {
            return Err(YtAgentError::InvalidInput("Query cannot be empty".to_string()));
        }

        if is_greeting(query) {
            return Ok(QueryResult {
                query: query.to_string(),
                response: GREETING_REPLY.to_string(),
                tool_calls: Vec::new(),
                rounds: 0,
            });
        }

        let response = self.agent.run_with(query, options).await?;

        Ok(QueryResult {
            query: query.to_string(),
            response: response.content,
            tool_calls: response.tool_calls,
            rounds: response.rounds,
        })
    }

    /// Answer several queries, each in its own conversation.
    ///
    /// Individual failures are reported in the batch; only an empty batch is
    /// an error.
    pub async fn process_batch(&self, queries: &[String], options: &RunOptions) -> Result<BatchReport> {
        if queries.is_empty() {
            return Err(YtAgentError::InvalidInput("No queries provided".to_string()));
        }

        Ok(run_batch(queries, self.batch_concurrency, move |query: String| async move {
            self.process_query(&query, options).await.map(|r| r.response)
        })
        .await)
    }

    /// Cache size, limit and backend type.
    pub async fn cache_stats(&self) -> Result<CacheStats> {
        match &self.cache {
            Some(cache) => cache.stats().await,
            None => Ok(CacheStats {
                backend: "disabled".to_string(),
                size: 0,
                max_size: 0,
            }),
        }
    }

    /// Drop every cached tool result.
    pub async fn cache_clear(&self) -> Result<()> {
        if let Some(cache) = &self.cache {
            cache.clear().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_models::{EchoModel, ScriptedModel};
    use crate::cache::MemoryCache;
    use crate::conversation::{AssistantTurn, ToolCallRequest};
    use crate::tools::{MockYoutubeProvider, SearchHit};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn memory_cache() -> Option<ToolCache> {
        Some(ToolCache::new(Arc::new(MemoryCache::new(50))))
    }

    fn search_turn(id: &str) -> AssistantTurn {
        AssistantTurn::tool_calls(vec![ToolCallRequest::new(
            id,
            "search_youtube",
            json!({"query": "rust async"}).as_object().cloned().unwrap(),
        )])
    }

    #[tokio::test]
    async fn test_greeting_skips_model() {
        let model = Arc::new(ScriptedModel::new(Vec::new()));
        let service = AgentService::with_components(
            model.clone(),
            Arc::new(MockYoutubeProvider::new()),
            None,
            &Settings::default(),
        );

        let result = service.process_query("  Hello ", &RunOptions::default()).await.unwrap();
        assert_eq!(result.response, GREETING_REPLY);
        assert_eq!(result.rounds, 0);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let service = AgentService::with_components(
            Arc::new(EchoModel),
            Arc::new(MockYoutubeProvider::new()),
            None,
            &Settings::default(),
        );
        let err = service.process_query("   ", &RunOptions::default()).await.unwrap_err();
        assert_eq!(err.status_hint(), 400);
    }

    #[tokio::test]
    async fn test_cache_shared_across_queries() {
        let mut youtube = MockYoutubeProvider::new();
        youtube.expect_search().times(1).returning(|_| {
            Ok(vec![SearchHit {
                title: "Async Rust".to_string(),
                video_id: "abcdefghijk".to_string(),
                url: "https://youtu.be/abcdefghijk".to_string(),
            }])
        });

        let model = Arc::new(ScriptedModel::new(vec![
            search_turn("a"),
            AssistantTurn::text("first"),
            search_turn("b"),
            AssistantTurn::text("second"),
        ]));
        let service = AgentService::with_components(model, Arc::new(youtube), memory_cache(), &Settings::default());

        let options = RunOptions::default();
        let first = service.process_query("rust async videos", &options).await.unwrap();
        let second = service.process_query("rust async videos again", &options).await.unwrap();

        assert_eq!(first.tool_calls[0].result, second.tool_calls[0].result);
        assert_eq!(service.cache_stats().await.unwrap().size, 1);

        service.cache_clear().await.unwrap();
        assert_eq!(service.cache_stats().await.unwrap().size, 0);
    }

    #[tokio::test]
    async fn test_batch() {
        let service = AgentService::with_components(
            Arc::new(EchoModel),
            Arc::new(MockYoutubeProvider::new()),
            memory_cache(),
            &Settings::default(),
        );

        let queries = vec!["one".to_string(), "fail two".to_string(), "hi".to_string()];
        let report = service.process_batch(&queries, &RunOptions::default()).await.unwrap();

        assert_eq!((report.total, report.successful, report.failed), (3, 2, 1));
        assert!(!report.results[1].success);
        assert_eq!(report.results[2].response.as_deref(), Some(GREETING_REPLY));

        let err = tokio_test::assert_err!(service.process_batch(&[], &RunOptions::default()).await);
        assert!(matches!(err, YtAgentError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_disabled_cache_stats() {
        let service = AgentService::with_components(
            Arc::new(EchoModel),
            Arc::new(MockYoutubeProvider::new()),
            None,
            &Settings::default(),
        );
        let stats = tokio_test::assert_ok!(service.cache_stats().await);
        assert_eq!(stats.backend, "disabled");
        tokio_test::assert_ok!(service.cache_clear().await);
    }
}
