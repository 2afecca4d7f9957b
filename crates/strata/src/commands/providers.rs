//! Provider commands: complete, providers, config.

use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;
use strata_sdk::providers::HealthState;
use strata_sdk::{CompletionOptions, RequestContext, Strata};

use super::Output;
use crate::config::Config;

/// Run a completion through the provider chain.
pub async fn complete(
    strata: &Strata,
    ctx: &RequestContext,
    prompt: &str,
    options: &CompletionOptions,
    timeout: Option<u64>,
    out: Output,
) -> Result<()> {
    let ctx = match timeout {
        Some(secs) => ctx
            .child()
            .with_deadline(tokio::time::Instant::now() + Duration::from_secs(secs)),
        None => ctx.clone(),
    };

    let text = strata
        .router()
        .complete(&ctx, prompt, options)
        .await
        .context("Completion failed")?;

    if out.json {
        return out.print_json(&json!({ "text": text }));
    }
    println!("{}", text);
    Ok(())
}

/// List providers in fallback order.
pub fn list(strata: &Strata, out: Output) -> Result<()> {
    let descriptors = strata.router().descriptors();

    if out.json {
        return out.print_json(&descriptors);
    }

    if descriptors.is_empty() {
        println!("{} No providers configured", "⚠".yellow());
        return Ok(());
    }

    println!("{} Providers (in fallback order):", "✓".green());
    println!();
    for descriptor in &descriptors {
        let health = match descriptor.health {
            HealthState::Healthy => descriptor.health.as_str().green(),
            HealthState::Degraded => descriptor.health.as_str().yellow(),
            HealthState::Unavailable => descriptor.health.as_str().red(),
        };
        let capabilities: Vec<&str> = descriptor.capabilities.iter().map(|c| c.as_str()).collect();
        println!(
            "  {:>3}  {} [{}] {}",
            descriptor.priority,
            descriptor.name.bold(),
            health,
            capabilities.join(", ").dimmed()
        );
    }
    Ok(())
}

/// Print the effective configuration.
pub fn show_config(config: &Config, out: Output) -> Result<()> {
    if out.json {
        return out.print_json(config);
    }
    print!("{}", config.to_toml()?);
    Ok(())
}
