//! HTTP API server for integration with other systems.
//!
//! Exposes single and batch queries plus cache maintenance over JSON.

use crate::agent::{BatchReport, RunOptions, ToolCallRecord};
use crate::cli::Output;
use crate::config::{ServerSettings, Settings};
use crate::error::{ModelErrorKind, YtAgentError};
use crate::service::AgentService;
use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

/// Shared application state.
struct AppState {
    service: AgentService,
}

/// Run the HTTP API server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> anyhow::Result<()> {
    let service = AgentService::from_settings(&settings)?;
    let state = Arc::new(AppState { service });

    let app = router(state, &settings.server);

    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("YouTube Agent API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Info", "GET  /");
    Output::kv("Health", "GET  /health");
    Output::kv("Query", "POST /query");
    Output::kv("Batch", "POST /batch");
    Output::kv("Cache stats", "GET  /cache/stats");
    Output::kv("Cache clear", "POST /cache/clear");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

fn router(state: Arc<AppState>, server: &ServerSettings) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/query", post(query))
        .route("/batch", post(batch))
        .route("/cache/stats", get(cache_stats))
        .route("/cache/clear", post(cache_clear))
        .layer(cors_layer(server))
        .with_state(state)
}

fn cors_layer(server: &ServerSettings) -> CorsLayer {
    if server.allow_all_origins {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = server
        .allowed_origins
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

// === Request/Response Types ===

fn default_use_cache() -> bool {
    true
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default = "default_use_cache")]
    use_cache: bool,
}

#[derive(Deserialize)]
struct BatchQueryRequest {
    queries: Vec<String>,
    #[serde(default = "default_use_cache")]
    use_cache: bool,
}

#[derive(Serialize)]
struct QueryResponse {
    query: String,
    response: String,
    success: bool,
    rounds: usize,
    tool_calls: Vec<ToolCallRecord>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<String>,
}

impl ErrorResponse {
    fn from_error(e: &YtAgentError) -> Self {
        let (error, provider, suggestion) = match e {
            YtAgentError::ModelInvocation {
                provider,
                kind: ModelErrorKind::RateLimited,
                ..
            } => (
                "Rate limit exceeded",
                Some(provider.clone()),
                Some("Wait for the rate limit to reset or upgrade your API plan"),
            ),
            YtAgentError::ModelInvocation {
                provider,
                kind: ModelErrorKind::MalformedResponse,
                ..
            } => (
                "LLM API returned an unexpected response",
                Some(provider.clone()),
                Some("Check the API key and llm.base_url, or switch to a different provider"),
            ),
            YtAgentError::ModelInvocation {
                provider,
                kind: ModelErrorKind::Authentication,
                ..
            } => (
                "LLM API rejected the credentials",
                Some(provider.clone()),
                Some("Verify the provider API key environment variable"),
            ),
            YtAgentError::InvalidInput(_) => ("Invalid request", None, None),
            YtAgentError::Timeout(_) => (
                "Query timed out",
                None,
                Some("Try a narrower question or raise agent.timeout_secs"),
            ),
            _ => ("Error processing query", None, None),
        };

        Self {
            error: error.to_string(),
            message: e.to_string(),
            provider,
            suggestion: suggestion.map(str::to_string),
        }
    }
}

fn error_response(e: &YtAgentError) -> Response {
    let status = StatusCode::from_u16(e.status_hint()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse::from_error(e))).into_response()
}

// === Handlers ===

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "YouTube Agent API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/query": "POST - Single query processing",
            "/batch": "POST - Batch query processing",
            "/cache/stats": "GET - Cache statistics",
            "/cache/clear": "POST - Clear cache",
            "/health": "GET - Health check",
        },
    }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy", "service": "ytagent" }))
}

async fn query(State(state): State<Arc<AppState>>, Json(req): Json<QueryRequest>) -> Response {
    let options = RunOptions::default().with_cache(req.use_cache);

    match state.service.process_query(&req.query, &options).await {
        Ok(result) => Json(QueryResponse {
            query: result.query,
            response: result.response,
            success: true,
            rounds: result.rounds,
            tool_calls: result.tool_calls,
        })
        .into_response(),
        Err(e) => {
            warn!("Query failed: {}", e);
            error_response(&e)
        }
    }
}

async fn batch(State(state): State<Arc<AppState>>, Json(req): Json<BatchQueryRequest>) -> Response {
    let options = RunOptions::default().with_cache(req.use_cache);

    match state.service.process_batch(&req.queries, &options).await {
        Ok(report) => Json::<BatchReport>(report).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> Response {
    match state.service.cache_stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn cache_clear(State(state): State<Arc<AppState>>) -> Response {
    match state.service.cache_clear().await {
        Ok(()) => Json(serde_json::json!({ "message": "Cache cleared successfully" })).into_response(),
        Err(e) => error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_models::EchoModel;
    use crate::cache::{MemoryCache, ToolCache};
    use crate::tools::MockYoutubeProvider;
    use serde_json::Value;

    fn state() -> Arc<AppState> {
        let service = AgentService::with_components(
            Arc::new(EchoModel),
            Arc::new(MockYoutubeProvider::new()),
            Some(ToolCache::new(Arc::new(MemoryCache::new(10)))),
            &Settings::default(),
        );
        Arc::new(AppState { service })
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_query_ok() {
        let response = query(
            State(state()),
            Json(QueryRequest {
                query: "what is new".to_string(),
                use_cache: true,
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["response"], "answer to what is new");
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_429() {
        let response = query(
            State(state()),
            Json(QueryRequest {
                query: "this will fail".to_string(),
                use_cache: true,
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Rate limit exceeded");
        assert_eq!(body["provider"], "echo");
    }

    #[tokio::test]
    async fn test_empty_batch_is_bad_request() {
        let response = batch(
            State(state()),
            Json(BatchQueryRequest {
                queries: Vec::new(),
                use_cache: true,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_batch_reports_counts() {
        let response = batch(
            State(state()),
            Json(BatchQueryRequest {
                queries: vec!["a".to_string(), "fail b".to_string()],
                use_cache: false,
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["successful"], 1);
        assert_eq!(body["failed"], 1);
        assert_eq!(body["results"][1]["success"], false);
    }

    #[tokio::test]
    async fn test_cache_stats_shape() {
        let body = body_json(cache_stats(State(state())).await).await;
        assert_eq!(body["type"], "memory");
        assert_eq!(body["size"], 0);
        assert_eq!(body["max_size"], 10);
    }

    #[test]
    fn test_router_builds_with_restricted_origins() {
        let server = ServerSettings {
            allowed_origins: vec!["http://localhost:5173".to_string(), "  ".to_string()],
            ..ServerSettings::default()
        };
        let _ = router(state(), &server);
    }
}
