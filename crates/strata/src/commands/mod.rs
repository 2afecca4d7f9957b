//! Command implementations for strata CLI.
//!
//! Every command except `config` opens a [`Strata`] instance, runs, and
//! shuts it down again so queued semantic writes reach the vector store
//! before the process exits.

pub mod memory;
pub mod providers;

use anyhow::{Context, Result};
use serde::Serialize;
use strata_sdk::{RequestContext, Strata};
use tracing::debug;

use crate::cli::Commands;
use crate::config::Config;

/// How results are printed.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize output")?);
        Ok(())
    }
}

/// Build and initialize the SDK from the CLI configuration.
pub async fn open(config: &Config) -> Result<Strata> {
    config.ensure_dirs()?;
    let providers = config.provider_handles()?;
    let mut strata = Strata::new(config.strata_config(), providers).context("Failed to set up strata")?;
    strata.initialize().await.context("Failed to initialize strata")?;
    Ok(strata)
}

/// Context cancelled by Ctrl-C.
fn interruptible_context() -> RequestContext {
    let ctx = RequestContext::background();
    let cancel = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupted; cancelling in-flight request");
            cancel.cancel();
        }
    });
    ctx
}

/// Execute a command.
pub async fn run(command: Commands, config: &Config, out: Output) -> Result<()> {
    if let Commands::Config = command {
        return providers::show_config(config, out);
    }

    let mut strata = open(config).await?;
    let result = dispatch(command, config, &strata, out).await;
    let closed = strata.shutdown().await.context("Failed to drain pending writes");
    result.and(closed)
}

async fn dispatch(command: Commands, config: &Config, strata: &Strata, out: Output) -> Result<()> {
    let ctx = interruptible_context();

    match command {
        Commands::Store {
            content,
            memory_type,
            id,
            meta,
        } => memory::store(strata, &ctx, content, &memory_type, id, &meta, out).await,
        Commands::Get { id } => memory::get(strata, &ctx, &id, out).await,
        Commands::Query {
            memory_type,
            contains,
            limit,
        } => memory::query(strata, &ctx, memory_type.as_deref(), contains, limit, out).await,
        Commands::Search { text, top_k } => memory::search(strata, &ctx, &text, top_k, out).await,
        Commands::Delete { id } => memory::delete(strata, &ctx, &id, out).await,
        Commands::Import { file, strict } => memory::import(strata, &ctx, &file, strict, out).await,
        Commands::Stats => memory::stats(strata, &ctx, out).await,
        Commands::Complete {
            prompt,
            temperature,
            max_tokens,
            model,
            timeout,
        } => {
            let options = strata_sdk::CompletionOptions {
                temperature,
                max_tokens,
                model,
            };
            providers::complete(strata, &ctx, &prompt, &options, timeout, out).await
        }
        Commands::Providers => providers::list(strata, out),
        Commands::Config => providers::show_config(config, out),
    }
}
