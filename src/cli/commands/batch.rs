//! Batch command implementation.

use super::ask::cancel_on_ctrl_c;
use crate::agent::RunOptions;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::service::AgentService;
use anyhow::{Context, Result};

/// Run the batch command.
pub async fn run_batch(
    queries: &[String],
    file: Option<&str>,
    no_cache: bool,
    json: bool,
    settings: Settings,
) -> Result<()> {
    let mut all_queries = match file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read queries from {}", path))?;
            parse_query_file(&content)
        }
        None => Vec::new(),
    };
    all_queries.extend(queries.iter().cloned());

    if all_queries.is_empty() {
        anyhow::bail!("No queries provided. Pass them as arguments or with --file.");
    }

    if let Err(e) = preflight::check(Operation::Query, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'ytagent doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let service = AgentService::from_settings(&settings)?;
    let options = RunOptions::default()
        .with_cache(!no_cache)
        .with_cancel(cancel_on_ctrl_c());

    let spinner = Output::spinner(&format!("Processing {} queries...", all_queries.len()));
    let report = service.process_batch(&all_queries, &options).await;
    spinner.finish_and_clear();
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        Output::header("Batch results");
        Output::batch_report(&report);
    }

    Ok(())
}

/// One query per line; blank lines and `#` comments are skipped.
fn parse_query_file(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
