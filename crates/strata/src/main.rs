//! strata - Tiered Agent Memory CLI
//!
//! Store, retrieve, query and search agent memory backed by a local SQLite
//! vector store, with embeddings and completions served by a provider
//! fallback chain.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;
mod config;

use cli::Cli;
use commands::Output;

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("strata=info".parse()?);

    // Logs go to stderr so stdout stays clean for results
    let json_layer = json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!json).then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.json)?;

    // Load configuration
    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }

    // Execute command
    commands::run(cli.command, &config, Output { json: cli.json }).await
}
