//! Batch mode: many independent queries, one report.

use super::runner::{Agent, RunOptions};
use crate::error::Result;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{info, warn};

/// Outcome of one query in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub query: String,
    pub response: Option<String>,
    pub success: bool,
    pub error: Option<String>,
}

/// Per-query results plus aggregate counts. Results keep input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<QueryOutcome>,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn from_outcomes(results: Vec<QueryOutcome>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            failed: results.len() - successful,
            successful,
            results,
        }
    }
}

/// Run `run` over every query with up to `concurrency` in flight.
///
/// A failing query is recorded and the rest carry on.
pub async fn run_batch<F, Fut>(queries: &[String], concurrency: usize, run: F) -> BatchReport
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    info!("Processing batch of {} queries", queries.len());

    let outcomes = stream::iter(queries.iter().cloned())
        .map(|query| {
            let fut = run(query.clone());
            async move {
                match fut.await {
                    Ok(response) => QueryOutcome {
                        query,
                        response: Some(response),
                        success: true,
                        error: None,
                    },
                    Err(e) => {
                        warn!("Batch query '{}' failed: {}", query, e);
                        QueryOutcome {
                            query,
                            response: None,
                            success: false,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
        })
        .buffered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    let report = BatchReport::from_outcomes(outcomes);
    info!(
        "Batch finished: {}/{} succeeded",
        report.successful, report.total
    );
    report
}

impl Agent {
    /// Run every query in its own conversation.
    pub async fn run_batch(&self, queries: &[String], options: &RunOptions, concurrency: usize) -> BatchReport {
        run_batch(queries, concurrency, move |query: String| async move {
            self.run_with(&query, options).await.map(|r| r.content)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::runner::test_models::EchoModel;
    use crate::config::CacheTtlSettings;
    use crate::tools::{MockYoutubeProvider, ToolContext};
    use std::sync::Arc;

    fn agent() -> Agent {
        let tools = ToolContext::new(
            Arc::new(MockYoutubeProvider::new()),
            None,
            CacheTtlSettings::default(),
        );
        Agent::new(Arc::new(EchoModel), Arc::new(tools))
    }

    fn queries() -> Vec<String> {
        vec![
            "first".to_string(),
            "this one will fail".to_string(),
            "third".to_string(),
        ]
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let report = agent().run_batch(&queries(), &RunOptions::default(), 1).await;

        assert_eq!(report.total, 3);
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 1);

        assert!(report.results[0].success);
        assert_eq!(report.results[0].response.as_deref(), Some("answer to first"));

        assert!(!report.results[1].success);
        assert!(report.results[1].response.is_none());
        assert!(!report.results[1].error.as_deref().unwrap_or_default().is_empty());

        assert_eq!(report.results[2].response.as_deref(), Some("answer to third"));
    }

    #[tokio::test]
    async fn test_concurrent_batch_keeps_order() {
        let report = agent().run_batch(&queries(), &RunOptions::default(), 3).await;

        let order: Vec<_> = report.results.iter().map(|r| r.query.as_str()).collect();
        assert_eq!(order, ["first", "this one will fail", "third"]);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let report = agent().run_batch(&[], &RunOptions::default(), 1).await;
        assert_eq!(report.total, 0);
        assert!(report.results.is_empty());
    }
}
