//! CLI module for ytagent.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// ytagent - ask questions about YouTube videos
///
/// A tool-calling agent that searches YouTube, reads transcripts and metadata,
/// and answers with sources.
#[derive(Parser, Debug)]
#[command(name = "ytagent")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask the agent a question
    Ask {
        /// The question, e.g. "Summarize https://youtu.be/dQw4w9WgXcQ"
        query: String,

        /// Bypass the tool result cache
        #[arg(long)]
        no_cache: bool,

        /// Print the tool calls the agent made
        #[arg(short, long)]
        trace: bool,
    },

    /// Answer several questions, one conversation each
    Batch {
        /// Queries to run
        queries: Vec<String>,

        /// Read queries from a file, one per line
        #[arg(short, long)]
        file: Option<String>,

        /// Bypass the tool result cache
        #[arg(long)]
        no_cache: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP API server
    Serve {
        /// Host to bind to (defaults to server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Inspect or clear the tool result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Check system requirements and configuration
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache type, size and limit
    Stats,

    /// Remove every cached entry
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask() {
        let cli = Cli::parse_from(["ytagent", "-vv", "ask", "summarize this", "--no-cache"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Ask { query, no_cache, trace } => {
                assert_eq!(query, "summarize this");
                assert!(no_cache);
                assert!(!trace);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_batch_with_file() {
        let cli = Cli::parse_from(["ytagent", "batch", "--file", "queries.txt", "extra query"]);
        match cli.command {
            Commands::Batch { queries, file, .. } => {
                assert_eq!(queries, ["extra query"]);
                assert_eq!(file.as_deref(), Some("queries.txt"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_cache_clear() {
        let cli = Cli::parse_from(["ytagent", "cache", "clear"]);
        assert!(matches!(
            cli.command,
            Commands::Cache {
                action: CacheAction::Clear
            }
        ));
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
