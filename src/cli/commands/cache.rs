//! Cache command implementation.

use crate::cache::ToolCache;
use crate::cli::preflight::{self, Operation};
use crate::cli::{CacheAction, Output};
use crate::config::Settings;
use anyhow::Result;

/// Run the cache command.
///
/// Only the sqlite backend outlives a process, so for the memory backend
/// this reports an empty cache.
pub async fn run_cache(action: &CacheAction, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Cache, &settings) {
        Output::warning(&e.to_string());
        return Ok(());
    }

    let cache = ToolCache::from_settings(&settings)?;

    match action {
        CacheAction::Stats => {
            let stats = cache.stats().await?;
            Output::header("Cache");
            Output::kv("Type", &stats.backend);
            Output::kv("Size", &stats.size.to_string());
            Output::kv("Max size", &stats.max_size.to_string());
            if settings.cache.backend == crate::config::CacheBackendKind::Sqlite {
                Output::kv("Path", &settings.cache_path().display().to_string());
            }
        }

        CacheAction::Clear => {
            cache.clear().await?;
            Output::success("Cache cleared successfully.");
        }
    }

    Ok(())
}
