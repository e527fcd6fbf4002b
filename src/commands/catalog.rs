//! Catalog command handlers: add and list records.

use anyhow::{Context, Result};
use organizer_core::{CatalogEntry, CatalogStore};
use tracing::info;

use super::{open_catalog, record_query};
use crate::app::context::RunContext;
use crate::cli::{AddArgs, ListArgs};

pub async fn run_add_command(args: &AddArgs, ctx: &RunContext) -> Result<()> {
    let catalog = open_catalog(&ctx.database_path).await?;

    let mut entry = CatalogEntry::new(args.name.trim(), args.model_type, args.download_url.trim());
    entry.url.clone_from(&args.url);
    entry.preview_url.clone_from(&args.preview_url);
    entry.description.clone_from(&args.description);
    entry.subdir.clone_from(&args.subdir);
    entry.download_path.clone_from(&args.download_path);
    entry.download_filename = args
        .filename
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    entry.groups = args
        .groups
        .iter()
        .map(|group| group.trim().to_string())
        .filter(|group| !group.is_empty())
        .collect();

    let id = catalog
        .insert(&entry)
        .await
        .context("Failed to add catalog record")?;
    info!(id, name = %entry.name, "catalog record added");
    println!("{id}");
    Ok(())
}

pub async fn run_list_command(args: &ListArgs, ctx: &RunContext) -> Result<()> {
    let catalog = open_catalog(&ctx.database_path).await?;

    let mut query = record_query(&args.filter);
    if args.not_downloaded {
        query = query.not_downloaded();
    }
    let entries = catalog
        .query(&query)
        .await
        .context("Failed to query catalog")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No catalog records found.");
        return Ok(());
    }
    for entry in &entries {
        println!("{}", format_entry_line(entry));
    }
    Ok(())
}

fn format_entry_line(entry: &CatalogEntry) -> String {
    let id = entry
        .id
        .map_or_else(|| "-".to_string(), |id| id.to_string());
    let state = if entry.is_downloaded() {
        "downloaded"
    } else if entry.is_downloadable() {
        "pending"
    } else {
        "no-url"
    };
    let groups = if entry.groups.is_empty() {
        String::new()
    } else {
        format!(" [{}]", entry.groups.join(", "))
    };
    format!(
        "{id:>5}  {:<16}  {:<10}  {}{groups}",
        entry.model_type.as_str(),
        state,
        entry.name
    )
}
