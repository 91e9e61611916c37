//! Ask command implementation.

use crate::agent::RunOptions;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::service::AgentService;
use anyhow::Result;
use tokio_util::sync::CancellationToken;

/// Run the ask command.
pub async fn run_ask(query: &str, no_cache: bool, trace: bool, settings: Settings) -> Result<()> {
    // Pre-flight checks
    if let Err(e) = preflight::check(Operation::Query, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'ytagent doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let service = AgentService::from_settings(&settings)?;
    let options = RunOptions::default()
        .with_cache(!no_cache)
        .with_cancel(cancel_on_ctrl_c());

    let spinner = Output::spinner("Agent working...");

    match service.process_query(query, &options).await {
        Ok(result) => {
            spinner.finish_and_clear();

            println!("\n{}\n", result.response);

            if trace && !result.tool_calls.is_empty() {
                Output::header(&format!("Tool calls ({})", result.tool_calls.len()));
                for call in &result.tool_calls {
                    Output::tool_call(call);
                }
                println!();
            }

            if result.rounds > 0 {
                Output::info(&format!("Completed in {} round(s)", result.rounds));
            }
        }
        Err(e) => {
            spinner.finish_and_clear();
            if e.is_rate_limited() {
                Output::error("Rate limit exceeded for the model provider.");
                Output::info("Wait for the limit to reset or switch llm.provider in the config.");
            } else {
                Output::error(&format!("Agent failed: {}", e));
            }
            return Err(e.into());
        }
    }

    Ok(())
}

/// Token that is cancelled when the user presses Ctrl+C.
pub(crate) fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}
