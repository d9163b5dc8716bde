//! Table source backed by JSON dumps on disk.
//!
//! Layout: `<db_dir>/<SOURCE>/<TABLE>.json`, each file holding
//! `{"<key>": {"<field>": "<value>", ...}, ...}`. On subscribe the current
//! entries are published as `SET` events. Afterwards the directory is
//! watched and every change is diffed against the last seen contents, so
//! the runner sees the same `SET`/`DEL` stream a database subscriber would
//! deliver.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use indexmap::IndexMap;
use log::{debug, error, info, warn};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};

use super::channel::{channel, ChannelPublisher, ChannelSource};
use super::{ChangeEvent, EventSource, TransportError};
use crate::directory::SlotId;
use crate::manager::Fields;

/// Contents of one table: entry key to its fields.
pub type Table = IndexMap<String, Fields>;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

type Snapshots = Arc<Mutex<HashMap<SlotId, Table>>>;

/// [`EventSource`] over the table dumps under one directory.
pub struct FileTableSource {
    db_dir: PathBuf,
    debounce: Duration,
    publisher: ChannelPublisher,
    source: ChannelSource,
    snapshots: Snapshots,
    watcher: Option<Debouncer<RecommendedWatcher>>,
}

impl FileTableSource {
    /// Source rooted at `db_dir`. Nothing is read until the first
    /// subscription.
    pub fn new(db_dir: impl Into<PathBuf>) -> Self {
        let (publisher, source) = channel();
        Self {
            db_dir: db_dir.into(),
            debounce: DEFAULT_DEBOUNCE,
            publisher,
            source,
            snapshots: Arc::new(Mutex::new(HashMap::new())),
            watcher: None,
        }
    }

    /// Overrides the watcher debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }

    /// Path of the dump file for `slot`.
    pub fn table_path(db_dir: &Path, slot: &SlotId) -> PathBuf {
        db_dir
            .join(&slot.source)
            .join(format!("{}.json", slot.table))
    }

    fn ensure_watching(&mut self) -> Result<(), TransportError> {
        if self.watcher.is_some() {
            return Ok(());
        }

        std::fs::create_dir_all(&self.db_dir).map_err(|e| TransportError::TableDirectory {
            path: self.db_dir.clone(),
            source: e,
        })?;

        let db_dir = self.db_dir.clone();
        let publisher = self.publisher.clone();
        let snapshots = Arc::clone(&self.snapshots);
        let mut debouncer = new_debouncer(self.debounce, move |res: DebounceEventResult| {
            match res {
                Ok(events) => {
                    debug!("{} change(s) under {}", events.len(), db_dir.display());
                    refresh_all(&db_dir, &snapshots, &publisher);
                }
                Err(e) => error!("Watch error: {}", e),
            }
        })
        .map_err(|e| TransportError::Watch(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&self.db_dir, RecursiveMode::Recursive)
            .map_err(|e| TransportError::Watch(e.to_string()))?;

        info!("Started watching table directory: {}", self.db_dir.display());
        self.watcher = Some(debouncer);
        Ok(())
    }
}

impl EventSource for FileTableSource {
    fn subscribe(&mut self, slot: &SlotId) -> Result<(), TransportError> {
        self.source.subscribe(slot)?;
        self.ensure_watching()?;

        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        if snapshots.contains_key(slot) {
            return Ok(());
        }
        snapshots.insert(slot.clone(), Table::new());
        refresh_slot(&self.db_dir, slot, &mut snapshots, &self.publisher);
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<ChangeEvent>, TransportError> {
        self.source.poll(timeout)
    }

    fn try_next(&mut self) -> Result<Option<ChangeEvent>, TransportError> {
        self.source.try_next()
    }
}

fn refresh_all(db_dir: &Path, snapshots: &Snapshots, publisher: &ChannelPublisher) {
    let mut snapshots = snapshots.lock().unwrap_or_else(PoisonError::into_inner);
    let slots: Vec<SlotId> = snapshots.keys().cloned().collect();
    for slot in slots {
        refresh_slot(db_dir, &slot, &mut snapshots, publisher);
    }
}

fn refresh_slot(
    db_dir: &Path,
    slot: &SlotId,
    snapshots: &mut HashMap<SlotId, Table>,
    publisher: &ChannelPublisher,
) {
    let path = FileTableSource::table_path(db_dir, slot);
    let current = match read_table(&path) {
        Ok(table) => table,
        Err(e) => {
            warn!("Skipping unreadable table dump {}: {}", path.display(), e);
            return;
        }
    };

    let previous = snapshots.get(slot).cloned().unwrap_or_default();
    for event in diff_tables(slot, &previous, &current) {
        if let Err(e) = publisher.publish(event) {
            error!("Failed to publish change for '{}': {}", slot, e);
            return;
        }
    }
    snapshots.insert(slot.clone(), current);
}

/// Reads a table dump. A missing file is an empty table.
fn read_table(path: &Path) -> Result<Table, String> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Table::new()),
        Err(e) => return Err(e.to_string()),
    };
    parse_table(&content)
}

/// Parses a table dump. Field values that are not strings are kept as
/// their JSON text.
pub fn parse_table(content: &str) -> Result<Table, String> {
    if content.trim().is_empty() {
        return Ok(Table::new());
    }
    let raw: IndexMap<String, IndexMap<String, serde_json::Value>> =
        serde_json::from_str(content).map_err(|e| e.to_string())?;

    Ok(raw
        .into_iter()
        .map(|(key, fields)| {
            let fields = fields
                .into_iter()
                .map(|(field, value)| {
                    let text = match value {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (field, text)
                })
                .collect();
            (key, fields)
        })
        .collect())
}

/// Events turning `old` into `new`: `SET` for added or changed keys in
/// `new`'s order, then `DEL` for keys that disappeared.
pub fn diff_tables(slot: &SlotId, old: &Table, new: &Table) -> Vec<ChangeEvent> {
    let sets = new
        .iter()
        .filter(|(key, fields)| old.get(*key) != Some(*fields))
        .map(|(key, fields)| ChangeEvent::set(slot.clone(), key.as_str(), fields.clone()));
    let dels = old
        .keys()
        .filter(|key| !new.contains_key(*key))
        .map(|key| ChangeEvent::del(slot.clone(), key.as_str()));
    sets.chain(dels).collect()
}
