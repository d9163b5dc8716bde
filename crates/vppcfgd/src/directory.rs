//! Dependency-aware key/value cache.
//!
//! The directory stores values per `(source, table)` slot and notifies
//! subscribed handlers whenever a write lands in a slot whose registered
//! path exists afterwards. Managers use it to gate their work on data
//! produced by other tables.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use log::{debug, error};

use crate::value::{Map, Value};

/// Identifies one storage slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId {
    /// Database name, e.g. `CONFIG_DB`.
    pub source: String,
    /// Table name, e.g. `PLATFORM`.
    pub table: String,
}

impl SlotId {
    /// Slot for `source` and `table`.
    pub fn new(source: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}__{}", self.source, self.table)
    }
}

/// A path that must exist in a slot before a handler can do real work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub slot: SlotId,
    /// `/`-separated path inside the slot.
    pub path: String,
}

impl Dependency {
    pub fn new(
        source: impl Into<String>,
        table: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            slot: SlotId::new(source, table),
            path: path.into(),
        }
    }
}

/// Callback invoked after a write to a slot it depends on.
pub type DepsHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Inner {
    data: IndexMap<SlotId, Map>,
    notify: IndexMap<SlotId, IndexMap<String, Vec<DepsHandler>>>,
}

impl Inner {
    fn path_traverse(&self, slot: &SlotId, path: &str) -> Option<Value> {
        let entries = self.data.get(slot)?;
        if path.is_empty() {
            return Some(Value::Mapping(entries.clone()));
        }
        let (head, rest) = match path.split_once('/') {
            Some((head, rest)) => (head, rest),
            None => (path, ""),
        };
        entries.get(head)?.traverse(rest).cloned()
    }

    fn path_exists(&self, slot: &SlotId, path: &str) -> bool {
        let Some(entries) = self.data.get(slot) else {
            return false;
        };
        if path.is_empty() {
            return true;
        }
        let (head, rest) = match path.split_once('/') {
            Some((head, rest)) => (head, rest),
            None => (path, ""),
        };
        entries
            .get(head)
            .and_then(|value| value.traverse(rest))
            .is_some()
    }
}

/// Shared store of slot data plus the dependency subscriptions on it.
#[derive(Default)]
pub struct Directory {
    inner: Mutex<Inner>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `value` under `key` and runs every handler whose path now
    /// exists in the slot.
    ///
    /// Handlers run after the internal lock is released, so they may read
    /// the directory. They must not write to it.
    pub fn put(&self, source: &str, table: &str, key: &str, value: Value) {
        let slot = SlotId::new(source, table);
        let handlers: Vec<DepsHandler> = {
            let mut inner = self.lock();
            inner
                .data
                .entry(slot.clone())
                .or_default()
                .insert(key.to_string(), value);

            match inner.notify.get(&slot) {
                Some(paths) => paths
                    .iter()
                    .filter(|(path, _)| inner.path_exists(&slot, path))
                    .flat_map(|(_, handlers)| handlers.iter().cloned())
                    .collect(),
                None => Vec::new(),
            }
        };

        debug!(
            "Directory: put '{}' into slot '{}', notifying {} handler(s)",
            key,
            slot,
            handlers.len()
        );
        for handler in handlers {
            handler();
        }
    }

    /// Returns the value stored under `key`, logging when it is absent.
    pub fn get(&self, source: &str, table: &str, key: &str) -> Option<Value> {
        let slot = SlotId::new(source, table);
        let inner = self.lock();
        match inner.data.get(&slot) {
            Some(entries) => {
                let value = entries.get(key).cloned();
                if value.is_none() {
                    error!(
                        "Directory: Can't get key '{}' from slot '{}'. The key doesn't exist",
                        key, slot
                    );
                }
                value
            }
            None => {
                error!(
                    "Directory: Can't get key '{}' from slot '{}'. The slot doesn't exist",
                    key, slot
                );
                None
            }
        }
    }

    /// Returns the value at `path`; the first path segment is the entry key.
    pub fn get_path(&self, source: &str, table: &str, path: &str) -> Option<Value> {
        self.lock()
            .path_traverse(&SlotId::new(source, table), path)
    }

    /// Whether `path` resolves inside the slot.
    pub fn path_exists(&self, source: &str, table: &str, path: &str) -> bool {
        self.lock().path_exists(&SlotId::new(source, table), path)
    }

    /// Snapshot of a whole slot.
    pub fn get_slot(&self, source: &str, table: &str) -> Option<Map> {
        self.lock().data.get(&SlotId::new(source, table)).cloned()
    }

    /// Removes `key` from the slot. Missing slots or keys are logged, not
    /// returned as errors.
    pub fn remove(&self, source: &str, table: &str, key: &str) {
        let slot = SlotId::new(source, table);
        let mut inner = self.lock();
        match inner.data.get_mut(&slot) {
            Some(entries) => {
                if entries.shift_remove(key).is_none() {
                    error!(
                        "Directory: Can't remove key '{}' from slot '{}'. The key doesn't exist",
                        key, slot
                    );
                }
            }
            None => {
                error!(
                    "Directory: Can't remove key '{}' from slot '{}'. The slot doesn't exist",
                    key, slot
                );
            }
        }
    }

    /// Drops a whole slot. A missing slot is logged.
    pub fn remove_slot(&self, source: &str, table: &str) {
        let slot = SlotId::new(source, table);
        if self.lock().data.shift_remove(&slot).is_none() {
            error!(
                "Directory: Can't remove slot '{}'. The slot doesn't exist",
                slot
            );
        }
    }

    /// True once anything has been written to the slot.
    pub fn available(&self, source: &str, table: &str) -> bool {
        self.lock()
            .data
            .contains_key(&SlotId::new(source, table))
    }

    /// True iff every dependency resolves to an existing path.
    pub fn available_deps(&self, deps: &[Dependency]) -> bool {
        let inner = self.lock();
        deps.iter()
            .all(|dep| inner.path_exists(&dep.slot, &dep.path))
    }

    /// Registers `handler` for every `(slot, path)` in `deps`.
    pub fn subscribe(&self, deps: &[Dependency], handler: DepsHandler) {
        let mut inner = self.lock();
        for dep in deps {
            inner
                .notify
                .entry(dep.slot.clone())
                .or_default()
                .entry(dep.path.clone())
                .or_default()
                .push(Arc::clone(&handler));
        }
    }
}

impl fmt::Debug for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Directory")
            .field("slots", &inner.data.keys().collect::<Vec<_>>())
            .field("subscribed_slots", &inner.notify.keys().collect::<Vec<_>>())
            .finish()
    }
}
