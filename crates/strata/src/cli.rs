//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Strata CLI
///
/// Store, retrieve and search tiered agent memory. Semantic memories are
/// persisted in the local vector store; short-term and episodic memories live
/// only for the duration of one command (use `import` to work with them).
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: <data dir>/config.toml)
    #[arg(long, global = true, env = "STRATA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the vector store database path
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// Emit JSON: structured log lines and machine-readable results
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store a memory item
    Store {
        /// Item content
        content: String,

        /// Memory type: context, episodic, semantic or working
        #[arg(short = 't', long = "type", default_value = "semantic")]
        memory_type: String,

        /// Item id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Metadata entry as key=value (repeatable)
        #[arg(short, long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },

    /// Retrieve an item by id
    Get {
        id: String,
    },

    /// List items of one type, optionally filtered by content
    Query {
        /// Memory type: context, episodic, semantic or working
        #[arg(short = 't', long = "type")]
        memory_type: Option<String>,

        /// Case-insensitive content filter
        #[arg(short, long)]
        contains: Option<String>,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Find persisted items similar to a text
    Search {
        text: String,

        /// Number of results
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,
    },

    /// Delete an item everywhere
    Delete {
        id: String,
    },

    /// Store items from a JSON Lines file
    ///
    /// Each line is an object with `content`, `memory_type` and optional
    /// `id`, `metadata` and `embedding`.
    Import {
        file: PathBuf,

        /// Stop at the first invalid line instead of skipping it
        #[arg(long)]
        strict: bool,
    },

    /// Run a completion through the provider chain
    Complete {
        prompt: String,

        /// Sampling temperature (0.0 - 2.0)
        #[arg(long, default_value = "0.7")]
        temperature: f32,

        /// Maximum tokens to generate
        #[arg(long, default_value = "1024")]
        max_tokens: u32,

        /// Model override
        #[arg(long)]
        model: Option<String>,

        /// Per-request deadline in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show memory statistics
    Stats,

    /// List configured providers and their health
    Providers,

    /// Print the effective configuration as TOML
    Config,
}
