//! History command handlers.

use anyhow::{Context, Result, bail};
use chrono::Local;
use papyrus_core::config::paths;
use papyrus_core::history::{HistoryGroups, HistoryStore, format_timestamp};
use papyrus_types::HistoryEntry;

pub(crate) fn open_store() -> Result<HistoryStore> {
    HistoryStore::open_dir(paths::storage_dir()?).context("open history")
}

pub fn list(search: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let entries = store.filter(search.unwrap_or_default());

    if entries.is_empty() {
        if store.is_empty() {
            println!("No search history yet");
        } else {
            println!("No history entries match.");
        }
        return Ok(());
    }

    let now = Local::now();
    let groups = HistoryGroups::partition(entries.iter().copied(), now);
    for (title, items) in groups.sections() {
        println!("{title}");
        for entry in items {
            print_summary(entry, now);
        }
        println!();
    }
    Ok(())
}

fn print_summary(entry: &HistoryEntry, now: chrono::DateTime<Local>) {
    let star = if entry.favorite { '★' } else { '☆' };
    println!("  {star} {}  {}", entry.id, entry.query);
    println!("      {}...", single_line(entry.preview()));
    println!(
        "      {}  {:.1}s  {} chunks",
        format_timestamp(entry.created_at_millis(), now),
        entry.response_time_secs,
        entry.settings.top_k
    );
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn show(id: i64) -> Result<()> {
    let store = open_store()?;
    let Some(entry) = store.get(id) else {
        bail!("No history entry with id {id}");
    };

    let settings = &entry.settings;
    println!("Query:     {}", entry.query);
    println!(
        "Asked:     {}",
        format_timestamp(entry.created_at_millis(), Local::now())
    );
    println!("Time:      {:.2}s", entry.response_time_secs);
    println!(
        "Settings:  top_k={} bm25={:.2} vector={:.2} template={}",
        settings.top_k, settings.bm25_weight, settings.vector_weight, settings.prompt_template
    );
    if entry.favorite {
        println!("Favorite:  yes");
    }
    println!();
    println!("{}", entry.answer);

    if !entry.sources.is_empty() {
        println!();
        super::ask::print_sources(&entry.sources);
    }
    Ok(())
}

pub fn favorite(id: i64) -> Result<()> {
    let mut store = open_store()?;
    match store.toggle_favorite(id)? {
        Some(true) => println!("Added {id} to favorites"),
        Some(false) => println!("Removed {id} from favorites"),
        None => bail!("No history entry with id {id}"),
    }
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let mut store = open_store()?;
    if !store.delete(id)? {
        bail!("No history entry with id {id}");
    }
    println!("Deleted {id}");
    Ok(())
}

pub fn clear() -> Result<()> {
    let mut store = open_store()?;
    let count = store.len();
    store.clear()?;
    println!("Cleared {count} history entries");
    Ok(())
}
