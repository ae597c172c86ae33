//! Persisted query history.
//!
//! The whole log is one JSON array under a single durable key. It is loaded
//! once when the store opens; after that the in-memory copy answers every
//! read and each mutation rewrites the full array.

mod slot;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use papyrus_types::{HistoryEntry, QuerySettings, Source, round2};
pub use slot::{FileStore, KeyValueStore, MemoryStore};

/// Durable key holding the serialized log.
pub const HISTORY_KEY: &str = "papyrus_query_history";

/// Capacity of the log. Older entries are evicted past this.
pub const MAX_HISTORY_ITEMS: usize = 100;

/// Data for a new entry; id and timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub query: String,
    pub answer: String,
    pub sources: Vec<Source>,
    pub settings: QuerySettings,
    pub response_time_secs: f64,
}

pub struct HistoryStore {
    slot: Box<dyn KeyValueStore>,
    entries: Vec<HistoryEntry>,
    last_id: i64,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("entries", &self.entries.len())
            .field("last_id", &self.last_id)
            .finish_non_exhaustive()
    }
}

impl HistoryStore {
    /// Opens the store and loads the log from `slot`.
    ///
    /// A blob that no longer parses is logged and treated as an empty log;
    /// it is overwritten by the next mutation.
    pub fn open(slot: Box<dyn KeyValueStore>) -> Result<Self> {
        let raw = slot.get(HISTORY_KEY).context("Failed to read history")?;
        let entries = match raw {
            Some(raw) => match serde_json::from_str::<Vec<HistoryEntry>>(&raw) {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!(error = %err, "history is unreadable, starting empty");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        let last_id = entries.iter().map(|e| e.id).max().unwrap_or(0);
        tracing::debug!(count = entries.len(), "loaded history");

        Ok(Self {
            slot,
            entries,
            last_id,
        })
    }

    /// Opens a file-backed store rooted at `dir`.
    pub fn open_dir(dir: impl Into<std::path::PathBuf>) -> Result<Self> {
        Self::open(Box::new(FileStore::new(dir)))
    }

    /// Opens an empty in-memory store.
    pub fn in_memory() -> Self {
        Self {
            slot: Box::new(MemoryStore::new()),
            entries: Vec::new(),
            last_id: 0,
        }
    }

    /// Inserts `entry` at the front, evicts past capacity, and persists.
    pub fn append(&mut self, entry: HistoryEntry) -> Result<()> {
        self.last_id = self.last_id.max(entry.id);
        self.entries.insert(0, entry);
        self.entries.truncate(MAX_HISTORY_ITEMS);
        self.persist()
    }

    /// Creates an entry stamped with the current time and appends it.
    pub fn record(&mut self, new: NewEntry) -> Result<HistoryEntry> {
        let id = self.next_id(Utc::now().timestamp_millis());
        let entry = HistoryEntry {
            id,
            query: new.query,
            answer: new.answer,
            sources: new.sources,
            timestamp: id,
            settings: new.settings,
            response_time_secs: round2(new.response_time_secs),
            favorite: false,
        };
        self.append(entry.clone())?;
        Ok(entry)
    }

    /// Ids are creation millis, bumped past the last id when the clock
    /// has not advanced.
    fn next_id(&self, now_millis: i64) -> i64 {
        now_millis.max(self.last_id + 1)
    }

    /// The log, newest first.
    pub fn list(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn get(&self, id: i64) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flips `favorite` on the entry with `id`.
    ///
    /// Returns the new flag, or `None` when no entry matches. A missing id
    /// changes nothing and does not touch storage.
    pub fn toggle_favorite(&mut self, id: i64) -> Result<Option<bool>> {
        let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) else {
            return Ok(None);
        };
        entry.favorite = !entry.favorite;
        let favorite = entry.favorite;
        self.persist()?;
        Ok(Some(favorite))
    }

    /// Removes the entry with `id`. Returns whether one was removed.
    pub fn delete(&mut self, id: i64) -> Result<bool> {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.persist()?;
        Ok(self.entries.len() != before)
    }

    /// Empties the log and removes the durable key.
    pub fn clear(&mut self) -> Result<()> {
        self.slot
            .remove(HISTORY_KEY)
            .context("Failed to clear history")?;
        self.entries.clear();
        Ok(())
    }

    /// Entries whose query or answer contains `term`, ignoring case.
    /// A blank term matches everything.
    pub fn filter(&self, term: &str) -> Vec<&HistoryEntry> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return self.entries.iter().collect();
        }
        self.entries.iter().filter(|e| e.matches(&needle)).collect()
    }

    fn persist(&mut self) -> Result<()> {
        let blob = serde_json::to_string(&self.entries).context("Failed to serialize history")?;
        self.slot
            .set(HISTORY_KEY, &blob)
            .context("Failed to save history")
    }
}

/// History partitioned for display. Each group keeps log order.
#[derive(Debug, Default, PartialEq)]
pub struct HistoryGroups<'a> {
    pub favorites: Vec<&'a HistoryEntry>,
    pub today: Vec<&'a HistoryEntry>,
    pub yesterday: Vec<&'a HistoryEntry>,
    pub older: Vec<&'a HistoryEntry>,
}

impl<'a> HistoryGroups<'a> {
    /// Favorites first regardless of age, then the rest by calendar day
    /// in local time.
    pub fn partition(
        entries: impl IntoIterator<Item = &'a HistoryEntry>,
        now: DateTime<Local>,
    ) -> Self {
        let today = now.date_naive();
        let yesterday = today.pred_opt();
        let mut groups = Self::default();

        for entry in entries {
            if entry.favorite {
                groups.favorites.push(entry);
                continue;
            }
            match local_date(entry.created_at_millis()) {
                Some(date) if date == today => groups.today.push(entry),
                Some(date) if Some(date) == yesterday => groups.yesterday.push(entry),
                _ => groups.older.push(entry),
            }
        }
        groups
    }

    pub fn is_empty(&self) -> bool {
        self.favorites.is_empty()
            && self.today.is_empty()
            && self.yesterday.is_empty()
            && self.older.is_empty()
    }

    /// Non-empty groups with their titles, in display order.
    pub fn sections(&self) -> Vec<(&'static str, &[&'a HistoryEntry])> {
        [
            ("Favorites", self.favorites.as_slice()),
            ("Today", self.today.as_slice()),
            ("Yesterday", self.yesterday.as_slice()),
            ("Older", self.older.as_slice()),
        ]
        .into_iter()
        .filter(|(_, entries)| !entries.is_empty())
        .collect()
    }
}

fn local_datetime(millis: i64) -> Option<DateTime<Local>> {
    Local.timestamp_millis_opt(millis).single()
}

fn local_date(millis: i64) -> Option<NaiveDate> {
    local_datetime(millis).map(|dt| dt.date_naive())
}

/// Short relative label for an entry time: `03:04 PM` for today,
/// `Yesterday 03:04 PM`, otherwise `Mar 7`.
pub fn format_timestamp(millis: i64, now: DateTime<Local>) -> String {
    let Some(when) = local_datetime(millis) else {
        return String::new();
    };
    let date = when.date_naive();
    if date == now.date_naive() {
        when.format("%I:%M %p").to_string()
    } else if Some(date) == now.date_naive().pred_opt() {
        format!("Yesterday {}", when.format("%I:%M %p"))
    } else {
        when.format("%b %-d").to_string()
    }
}
