//! Memory commands: store, get, query, search, delete, import, stats.
//!
//! Memory tiers:
//! - Short-term: context and working memories
//! - Episodic: episodic memories
//! - Semantic: semantic memories, persisted in the vector store

use std::path::Path;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde_json::json;
use strata_sdk::memory::parse_memory_type;
use strata_sdk::{MemoryItem, MemoryTier, Metadata, MetadataValue, NewMemory, RequestContext, Strata};
use tracing::warn;

use super::Output;

/// Parse `key=value` pairs into metadata, inferring scalar types.
fn parse_metadata(pairs: &[String]) -> Result<Metadata> {
    let mut metadata = Metadata::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid metadata '{}'. Use key=value", pair);
        };
        metadata.insert(key.trim().to_string(), MetadataValue::infer(value.trim()));
    }
    Ok(metadata)
}

/// Store something in memory.
pub async fn store(
    strata: &Strata,
    ctx: &RequestContext,
    content: String,
    memory_type: &str,
    id: Option<String>,
    meta: &[String],
    out: Output,
) -> Result<()> {
    let memory_type = parse_memory_type(memory_type)?;
    let mut input = NewMemory::new(content, memory_type);
    input.id = id;
    input.metadata = parse_metadata(meta)?;

    let id = strata
        .memory()
        .store(ctx, input)
        .await
        .context("Failed to store memory item")?;
    let tier = memory_type.tier();

    if out.json {
        return out.print_json(&json!({ "id": id, "tier": tier, "memory_type": memory_type }));
    }

    println!("{} Stored in {} memory", "✓".green(), tier_display(tier).cyan());
    println!("  ID: {}", id);
    if !tier.is_durable() {
        println!("  {}", "Not persisted: this tier lives only for the current process".dimmed());
    }
    Ok(())
}

/// Retrieve one item.
pub async fn get(strata: &Strata, ctx: &RequestContext, id: &str, out: Output) -> Result<()> {
    match strata.memory().retrieve(ctx, id).await {
        Ok(item) => {
            if out.json {
                return out.print_json(&item);
            }
            print_memory_item(1, &item, None);
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            if out.json {
                return out.print_json(&serde_json::Value::Null);
            }
            println!("{} Memory not found: {}", "⚠".yellow(), id);
            Ok(())
        }
        Err(e) => Err(e).context("Failed to retrieve memory item"),
    }
}

/// List items matching a type and content filter.
pub async fn query(
    strata: &Strata,
    ctx: &RequestContext,
    memory_type: Option<&str>,
    contains: Option<String>,
    limit: usize,
    out: Output,
) -> Result<()> {
    let needle = contains.map(|c| c.to_lowercase());
    let predicate = move |item: &MemoryItem| match &needle {
        Some(n) => item.content.to_lowercase().contains(n),
        None => true,
    };

    let cursor = match memory_type {
        Some(t) => strata.memory().query(ctx, parse_memory_type(t)?, predicate),
        None => strata.memory().query_all(ctx, predicate),
    };
    let items = cursor.collect(limit).await.context("Failed to query memory")?;

    if out.json {
        return out.print_json(&items);
    }

    if items.is_empty() {
        println!("{} No memories found matching criteria", "⚠".yellow());
        return Ok(());
    }

    println!("{} Found {} memories:", "✓".green(), items.len());
    println!();
    for (i, item) in items.iter().enumerate() {
        print_memory_item(i + 1, item, None);
    }
    Ok(())
}

/// Similarity search over persisted items.
pub async fn search(strata: &Strata, ctx: &RequestContext, text: &str, top_k: usize, out: Output) -> Result<()> {
    let hits = strata
        .memory()
        .search(ctx, text, top_k)
        .await
        .context("Failed to search memory")?;

    if out.json {
        return out.print_json(&hits);
    }

    if hits.is_empty() {
        println!("{} No similar memories found", "⚠".yellow());
        return Ok(());
    }

    println!("{} Top {} matches:", "✓".green(), hits.len());
    println!();
    for (i, hit) in hits.iter().enumerate() {
        print_memory_item(i + 1, &hit.item, Some(hit.score));
    }
    Ok(())
}

/// Delete an item.
pub async fn delete(strata: &Strata, ctx: &RequestContext, id: &str, out: Output) -> Result<()> {
    let deleted = strata
        .memory()
        .delete(ctx, id)
        .await
        .context("Failed to delete memory item")?;

    if out.json {
        return out.print_json(&json!({ "id": id, "deleted": deleted }));
    }

    if deleted {
        println!("{} Deleted memory: {}", "✓".green(), id);
    } else {
        println!("{} Memory not found: {}", "⚠".yellow(), id);
    }
    Ok(())
}

/// Store every line of a JSON Lines file.
pub async fn import(strata: &Strata, ctx: &RequestContext, file: &Path, strict: bool, out: Output) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let mut imported = 0usize;
    let mut skipped = 0usize;

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let input: NewMemory = match serde_json::from_str(line) {
            Ok(input) => input,
            Err(e) if strict => bail!("{}:{}: {}", file.display(), line_no, e),
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping unparseable line");
                skipped += 1;
                continue;
            }
        };

        match strata.memory().store(ctx, input).await {
            Ok(_) => imported += 1,
            Err(e) if e.is_validation() && !strict => {
                warn!(line = line_no, error = %e, "skipping invalid item");
                skipped += 1;
            }
            Err(e) => return Err(e).with_context(|| format!("{}:{}", file.display(), line_no)),
        }
    }

    // Make the import durable before reporting
    strata.memory().flush(ctx).await.context("Failed to flush imported items")?;
    let failed = strata.memory().stats().persistence_failures;

    if out.json {
        return out.print_json(&json!({ "imported": imported, "skipped": skipped, "failed": failed }));
    }

    println!("{} Imported {} memories", "✓".green(), imported.to_string().bold());
    if skipped > 0 {
        println!("  Skipped: {}", skipped.to_string().yellow());
    }
    if failed > 0 {
        println!("  {} {} semantic writes failed to persist", "✗".red(), failed);
    }
    Ok(())
}

/// Show memory statistics.
pub async fn stats(strata: &Strata, ctx: &RequestContext, out: Output) -> Result<()> {
    let stats = strata.memory().stats();
    let persisted = strata
        .memory()
        .vector_store()
        .count(ctx)
        .await
        .context("Failed to count persisted items")?;

    if out.json {
        return out.print_json(&json!({ "persisted_items": persisted, "memory": stats }));
    }

    println!("{} Memory Statistics", "📊".cyan());
    println!();
    println!("  Persisted items: {}", persisted.to_string().bold());
    println!();
    println!("  Cache tiers:");
    for tier in &stats.tiers {
        println!(
            "    {:<11} {:>5} / {:<5} pinned {}  hits {}  evictions {}",
            format!("{}:", tier_display(tier.tier)),
            tier.items.to_string().color(tier_color(tier.tier)),
            tier.max_items,
            tier.pinned,
            tier.hits,
            tier.evictions
        );
    }
    println!("    Misses: {}", stats.cache_misses);
    println!();
    println!(
        "  Embedding cache: {} entries, {} hits, {} misses",
        stats.embedding_cache_size, stats.embedding_cache_hits, stats.embedding_cache_misses
    );
    println!(
        "  Writes: {} persisted, {} pending, {} failed",
        stats.persisted_writes, stats.pending_writes, stats.persistence_failures
    );
    Ok(())
}

/// Convert tier to display format.
fn tier_display(tier: MemoryTier) -> &'static str {
    match tier {
        MemoryTier::ShortTerm => "short-term",
        MemoryTier::Episodic => "episodic",
        MemoryTier::Semantic => "semantic",
    }
}

fn tier_color(tier: MemoryTier) -> &'static str {
    match tier {
        MemoryTier::ShortTerm => "yellow",
        MemoryTier::Episodic => "cyan",
        MemoryTier::Semantic => "green",
    }
}

/// Print a memory item with formatting.
fn print_memory_item(index: usize, item: &MemoryItem, score: Option<f32>) {
    let short_id: String = item.id.chars().take(8).collect();

    println!(
        "  {}. {} [{}] <{}> v{}",
        index,
        short_id.cyan(),
        tier_display(item.tier()).color(tier_color(item.tier())),
        item.memory_type.as_str().dimmed(),
        item.version
    );

    // Truncate content for display
    let content = if item.content.chars().count() > 100 {
        format!("{}...", item.content.chars().take(100).collect::<String>())
    } else {
        item.content.clone()
    };
    println!("     {}", content);

    if let Some(score) = score {
        println!("     Similarity: {:.3}", score);
    }

    if !item.metadata.is_empty() {
        let pairs: Vec<String> = item.metadata.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        println!("     Meta: {}", pairs.join(", ").dimmed());
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metadata() {
        let metadata = parse_metadata(&["source=chat".to_string(), "turn = 3".to_string()]).unwrap();
        assert_eq!(metadata.get("source"), Some(&MetadataValue::Text("chat".into())));
        assert_eq!(metadata.get("turn"), Some(&MetadataValue::Integer(3)));
        assert!(parse_metadata(&["novalue".to_string()]).is_err());
    }

    #[test]
    fn test_tier_display() {
        assert_eq!(tier_display(MemoryTier::ShortTerm), "short-term");
        assert_eq!(tier_display(MemoryTier::Semantic), "semantic");
    }
}
