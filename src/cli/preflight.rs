//! Pre-flight checks before talking to the model.
//!
//! Validates that required tools and configuration are available
//! before starting a query that would otherwise fail midway.

use crate::config::Settings;
use crate::error::{Result, YtAgentError};
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Queries need the model API key and yt-dlp.
    Query,
    /// Cache maintenance needs caching to be enabled.
    Cache,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Query => {
            settings.llm.api_key()?;
            check_tool("yt-dlp")?;
        }
        Operation::Cache => {
            if !settings.cache.enabled {
                return Err(YtAgentError::Config(
                    "Caching is disabled. Set cache.enabled = true in the config file.".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Check if an external tool is available.
pub fn check_tool(name: &str) -> Result<()> {
    match Command::new(name).arg("--version").output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(YtAgentError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(YtAgentError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(YtAgentError::ToolNotFound(format!("{}: {}", name, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_requires_enabled_cache() {
        let mut settings = Settings::default();
        assert!(check(Operation::Cache, &settings).is_ok());

        settings.cache.enabled = false;
        let err = check(Operation::Cache, &settings).unwrap_err();
        assert!(matches!(err, YtAgentError::Config(msg) if msg.contains("cache.enabled")));
    }

    #[test]
    fn test_missing_tool() {
        let err = check_tool("ytagent-definitely-not-installed").unwrap_err();
        assert!(matches!(err, YtAgentError::ToolNotFound(_)));
    }
}
