//! CLI module for the semantic cache
//!
//! Every subcommand loads configuration, initializes logging and the cache,
//! runs one operation and prints the result as JSON on stdout:
//! - `lookup`: find a cached response for a prompt
//! - `store`: cache a response for a prompt
//! - `remove`: invalidate the entry for a prompt
//! - `reset`: drop every entry
//! - `stats`: show cache statistics
//! - `purge`: drop entries older than the configured TTL

mod cache;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub use cache::run;

/// Semantic Cache - similarity-keyed response cache for chat workloads
#[derive(Parser)]
#[command(name = "semantic-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Snapshot file to load from and persist to (overrides config)
    #[arg(long, global = true)]
    pub snapshot: Option<PathBuf>,

    /// Relevance threshold for this invocation (0.0 to 1.0)
    #[arg(long, global = true)]
    pub min_relevance: Option<f32>,

    #[command(subcommand)]
    pub command: Command,
}

/// A prompt and the conversation it was asked in
#[derive(Args, Clone, Debug)]
pub struct PromptArgs {
    /// The user prompt
    #[arg(long)]
    pub prompt: String,

    /// JSON file holding the prior messages as `[{"role": ..., "content": ...}]`
    #[arg(long)]
    pub history: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Look up a cached response
    Lookup(PromptArgs),

    /// Cache a response
    Store {
        #[command(flatten)]
        prompt: PromptArgs,

        /// Response to cache; parsed as JSON when valid, stored as a string otherwise
        #[arg(long)]
        response: String,
    },

    /// Remove the entry cached for exactly this prompt and history
    Remove(PromptArgs),

    /// Drop every entry
    Reset,

    /// Show cache statistics
    Stats,

    /// Drop entries older than the configured TTL
    Purge,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_store() {
        let cli = Cli::parse_from([
            "semantic-cache",
            "--snapshot",
            "/tmp/cache.json",
            "store",
            "--prompt",
            "What is the capital of France?",
            "--response",
            "Paris",
        ]);

        assert_eq!(cli.snapshot, Some(PathBuf::from("/tmp/cache.json")));
        match cli.command {
            Command::Store { prompt, response } => {
                assert_eq!(prompt.prompt, "What is the capital of France?");
                assert!(prompt.history.is_none());
                assert_eq!(response, "Paris");
            }
            _ => panic!("expected store command"),
        }
    }

    #[test]
    fn test_parse_lookup_with_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "semantic-cache",
            "lookup",
            "--prompt",
            "hi",
            "--history",
            "history.json",
            "--min-relevance",
            "0.9",
        ]);

        assert_eq!(cli.min_relevance, Some(0.9));
        assert!(matches!(cli.command, Command::Lookup(ref args) if args.history.is_some()));
    }
}
