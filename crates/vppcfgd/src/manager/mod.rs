//! Table managers.
//!
//! A [`Manager`] is bound to one `(source, table)` slot. It receives the
//! slot's change events, holds `SET` events back until its dependencies are
//! present in the [`Directory`], and retries held events in arrival order
//! whenever the directory reports a change on one of those dependencies.
//! The table-specific work is delegated to a [`TableHandler`].

pub mod vppcfg;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use indexmap::IndexMap;
use log::{debug, error};
use thiserror::Error;

use crate::directory::{Dependency, Directory, SlotId};
use crate::value::ValueError;

pub use vppcfg::{VppCfgHandler, VPP_KEY};

/// Field/value pairs carried by a table event.
pub type Fields = IndexMap<String, String>;

/// Operation code of a table event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Set,
    Del,
    /// Anything else; rejected by [`EventHandler::handle`].
    Unknown(String),
}

impl From<&str> for Operation {
    fn from(op: &str) -> Self {
        match op {
            "SET" => Operation::Set,
            "DEL" => Operation::Del,
            other => Operation::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Set => f.write_str("SET"),
            Operation::Del => f.write_str("DEL"),
            Operation::Unknown(op) => f.write_str(op),
        }
    }
}

/// Result of a `SET` handler call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// The entry was processed.
    Applied,
    /// The handler cannot process the entry yet; it will be retried.
    NotReady,
}

/// Why an entry is sitting in the pending queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingReason {
    /// Some dependency was missing when the entry arrived.
    DependenciesUnmet,
    /// The handler answered [`SetOutcome::NotReady`].
    HandlerDeclined,
}

/// A held-back `SET` event.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub key: String,
    pub data: Fields,
    /// Logged when the entry is queued.
    pub reason: PendingReason,
}

/// Errors raised while handling a table event.
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Invalid operation '{op}' for key '{key}'")]
    InvalidOperation { op: String, key: String },

    #[error("Malformed value for field '{field}' of key '{key}': {source}")]
    MalformedPayload {
        key: String,
        field: String,
        #[source]
        source: ValueError,
    },
}

/// Table-specific behaviour plugged into a [`Manager`].
pub trait TableHandler: Send {
    /// Handles a `SET` whose dependencies are satisfied.
    fn set_handler(&mut self, key: &str, data: &Fields) -> Result<SetOutcome, ManagerError>;

    /// Handles a `DEL`. Deletions are never gated.
    fn del_handler(&mut self, key: &str);
}

/// Object-safe view of a manager used by the runner for dispatch.
pub trait EventHandler: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &str;

    /// The `(source, table)` slot whose events this handler receives.
    fn slot(&self) -> &SlotId;

    /// Handles one event for `key`.
    fn handle(&self, key: &str, op: &Operation, data: &Fields) -> Result<(), ManagerError>;
}

/// Dependency-gated handler for one table slot.
///
/// The handler and the pending queue live behind a single lock. A
/// dependency change that arrives while the lock is held, from another
/// thread or from the handler itself, is recorded and replayed by the
/// holder once it lets go.
pub struct Manager<H> {
    name: String,
    slot: SlotId,
    deps: Vec<Dependency>,
    directory: Arc<Directory>,
    state: Mutex<State<H>>,
    retry_requested: AtomicBool,
}

struct State<H> {
    handler: H,
    pending: VecDeque<PendingEntry>,
}

impl<H: TableHandler + 'static> Manager<H> {
    /// Creates the manager and subscribes it to changes of its dependencies.
    pub fn new(
        name: impl Into<String>,
        directory: Arc<Directory>,
        deps: Vec<Dependency>,
        slot: SlotId,
        handler: H,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            name: name.into(),
            slot,
            deps,
            directory,
            state: Mutex::new(State {
                handler,
                pending: VecDeque::new(),
            }),
            retry_requested: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&manager);
        manager.directory.subscribe(
            &manager.deps,
            Arc::new(move || {
                if let Some(manager) = weak.upgrade() {
                    manager.on_deps_change();
                }
            }),
        );

        manager
    }

    pub fn deps(&self) -> &[Dependency] {
        &self.deps
    }

    /// Number of queued entries. Must not be called from inside
    /// [`Manager::with_handler`].
    pub fn pending_len(&self) -> usize {
        self.lock_state().pending.len()
    }

    /// Keys of the queued entries, oldest first.
    pub fn pending_keys(&self) -> Vec<String> {
        self.lock_state()
            .pending
            .iter()
            .map(|e| e.key.clone())
            .collect()
    }

    /// Runs a closure against the wrapped handler. Dependency changes seen
    /// while the closure runs are retried before this returns.
    pub fn with_handler<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        let result = f(&mut self.lock_state().handler);
        self.drain_retries();
        result
    }

    /// Retries every pending entry, oldest first, if the dependencies are
    /// now satisfied. Entries that are still not ready keep their relative
    /// order and stay ahead of anything queued during the retry.
    ///
    /// If the manager is busy the request is recorded and the current
    /// holder runs the retry when it releases the manager.
    pub fn on_deps_change(&self) {
        self.retry_requested.store(true, Ordering::SeqCst);
        self.drain_retries();
    }

    fn drain_retries(&self) {
        while self.retry_requested.load(Ordering::SeqCst) {
            let mut state = match self.state.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    debug!("{}: busy, deferring retry to the current holder", self.name);
                    return;
                }
            };
            if self.retry_requested.swap(false, Ordering::SeqCst)
                && self.directory.available_deps(&self.deps)
            {
                self.retry_pending(&mut state);
            }
        }
    }

    fn retry_pending(&self, state: &mut State<H>) {
        let queued = std::mem::take(&mut state.pending);
        if queued.is_empty() {
            return;
        }
        debug!("{}: retrying {} pending entries", self.name, queued.len());

        let mut survivors = VecDeque::with_capacity(queued.len());
        for mut entry in queued {
            match state.handler.set_handler(&entry.key, &entry.data) {
                Ok(SetOutcome::Applied) => {
                    debug!("{}: pending entry '{}' applied", self.name, entry.key);
                }
                Ok(SetOutcome::NotReady) => {
                    entry.reason = PendingReason::HandlerDeclined;
                    survivors.push_back(entry);
                }
                Err(e) => {
                    error!(
                        "{}: dropping pending entry '{}': {}",
                        self.name, entry.key, e
                    );
                }
            }
        }

        survivors.extend(state.pending.drain(..));
        state.pending = survivors;
    }

    fn enqueue(&self, state: &mut State<H>, key: &str, data: &Fields, reason: PendingReason) {
        match reason {
            PendingReason::DependenciesUnmet => debug!(
                "{}: not all dependencies are met, queueing '{}'",
                self.name, key
            ),
            PendingReason::HandlerDeclined => debug!(
                "{}: 'SET' handler returned NOT_READY, queueing '{}'",
                self.name, key
            ),
        }
        state.pending.push_back(PendingEntry {
            key: key.to_string(),
            data: data.clone(),
            reason,
        });
    }

    fn apply(&self, key: &str, op: &Operation, data: &Fields) -> Result<(), ManagerError> {
        match op {
            Operation::Set => {
                let mut state = self.lock_state();
                if !self.directory.available_deps(&self.deps) {
                    self.enqueue(&mut state, key, data, PendingReason::DependenciesUnmet);
                    return Ok(());
                }
                if state.handler.set_handler(key, data)? == SetOutcome::NotReady {
                    self.enqueue(&mut state, key, data, PendingReason::HandlerDeclined);
                }
                Ok(())
            }
            Operation::Del => {
                self.lock_state().handler.del_handler(key);
                Ok(())
            }
            Operation::Unknown(op) => Err(ManagerError::InvalidOperation {
                op: op.clone(),
                key: key.to_string(),
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State<H>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<H: TableHandler + 'static> EventHandler for Manager<H> {
    fn name(&self) -> &str {
        &self.name
    }

    fn slot(&self) -> &SlotId {
        &self.slot
    }

    fn handle(&self, key: &str, op: &Operation, data: &Fields) -> Result<(), ManagerError> {
        let result = self.apply(key, op, data);
        self.drain_retries();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::collections::HashSet;

    /// Records calls and declines keys listed in `blocked`.
    #[derive(Default)]
    struct Recorder {
        applied: Vec<String>,
        deleted: Vec<String>,
        blocked: HashSet<String>,
        calls: Vec<String>,
    }

    impl TableHandler for Recorder {
        fn set_handler(&mut self, key: &str, data: &Fields) -> Result<SetOutcome, ManagerError> {
            self.calls.push(key.to_string());
            if let Some(bad) = data.get("bad") {
                return Err(ManagerError::MalformedPayload {
                    key: key.to_string(),
                    field: "bad".to_string(),
                    source: Value::from_json_str(bad).unwrap_err(),
                });
            }
            if self.blocked.contains(key) {
                return Ok(SetOutcome::NotReady);
            }
            self.applied.push(key.to_string());
            Ok(SetOutcome::Applied)
        }

        fn del_handler(&mut self, key: &str) {
            self.deleted.push(key.to_string());
        }
    }

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn gated_manager(directory: &Arc<Directory>) -> Arc<Manager<Recorder>> {
        Manager::new(
            "TestMgr",
            Arc::clone(directory),
            vec![Dependency::new("CONFIG_DB", "DEVICE_METADATA", "localhost")],
            SlotId::new("CONFIG_DB", "BGP_NEIGHBOR"),
            Recorder::default(),
        )
    }

    #[test]
    fn test_set_without_deps_is_applied_immediately() {
        let directory = Arc::new(Directory::new());
        let manager = Manager::new(
            "TestMgr",
            directory,
            vec![],
            SlotId::new("CONFIG_DB", "PLATFORM"),
            Recorder::default(),
        );

        manager.handle("vpp", &Operation::Set, &Fields::new()).unwrap();
        assert_eq!(manager.pending_len(), 0);
        manager.with_handler(|h| assert_eq!(h.applied, vec!["vpp"]));
    }

    #[test]
    fn test_set_is_queued_until_deps_arrive() {
        let directory = Arc::new(Directory::new());
        let manager = gated_manager(&directory);

        for key in ["e1", "e2", "e3"] {
            manager.handle(key, &Operation::Set, &Fields::new()).unwrap();
        }
        assert_eq!(manager.pending_keys(), vec!["e1", "e2", "e3"]);
        manager.with_handler(|h| assert!(h.calls.is_empty()));

        directory.put("CONFIG_DB", "DEVICE_METADATA", "localhost", Value::mapping());

        assert_eq!(manager.pending_len(), 0);
        manager.with_handler(|h| assert_eq!(h.applied, vec!["e1", "e2", "e3"]));
    }

    #[test]
    fn test_retry_preserves_fifo_order_of_survivors() {
        let directory = Arc::new(Directory::new());
        let manager = gated_manager(&directory);
        manager.with_handler(|h| {
            h.blocked.insert("e1".to_string());
            h.blocked.insert("e3".to_string());
        });

        for key in ["e1", "e2", "e3"] {
            manager.handle(key, &Operation::Set, &Fields::new()).unwrap();
        }

        directory.put("CONFIG_DB", "DEVICE_METADATA", "localhost", Value::mapping());
        assert_eq!(manager.pending_keys(), vec!["e1", "e3"]);

        // A second transition retries again in the same order.
        manager.with_handler(|h| {
            h.calls.clear();
            h.blocked.remove("e3");
        });
        directory.put("CONFIG_DB", "DEVICE_METADATA", "localhost", Value::mapping());
        manager.with_handler(|h| {
            assert_eq!(h.calls, vec!["e1", "e3"]);
            assert_eq!(h.applied, vec!["e2", "e3"]);
        });
        assert_eq!(manager.pending_keys(), vec!["e1"]);
    }

    #[test]
    fn test_not_ready_with_deps_met_is_queued() {
        let directory = Arc::new(Directory::new());
        directory.put("CONFIG_DB", "DEVICE_METADATA", "localhost", Value::mapping());
        let manager = gated_manager(&directory);
        manager.with_handler(|h| {
            h.blocked.insert("e1".to_string());
        });

        manager.handle("e1", &Operation::Set, &Fields::new()).unwrap();
        assert_eq!(manager.pending_keys(), vec!["e1"]);
    }

    #[test]
    fn test_malformed_payload_is_not_queued() {
        let directory = Arc::new(Directory::new());
        let manager = Manager::new(
            "TestMgr",
            directory,
            vec![],
            SlotId::new("CONFIG_DB", "PLATFORM"),
            Recorder::default(),
        );

        let result = manager.handle("vpp", &Operation::Set, &fields(&[("bad", "{oops")]));
        assert!(matches!(
            result,
            Err(ManagerError::MalformedPayload { ref field, .. }) if field == "bad"
        ));
        assert_eq!(manager.pending_len(), 0);
    }

    #[test]
    fn test_malformed_pending_entry_is_dropped_on_retry() {
        let directory = Arc::new(Directory::new());
        let manager = gated_manager(&directory);

        manager
            .handle("e1", &Operation::Set, &fields(&[("bad", "[1]")]))
            .unwrap();
        manager.handle("e2", &Operation::Set, &Fields::new()).unwrap();
        assert_eq!(manager.pending_len(), 2);

        directory.put("CONFIG_DB", "DEVICE_METADATA", "localhost", Value::mapping());
        assert_eq!(manager.pending_len(), 0);
        manager.with_handler(|h| assert_eq!(h.applied, vec!["e2"]));
    }

    #[test]
    fn test_deps_arriving_from_another_thread_while_busy_are_retried() {
        let directory = Arc::new(Directory::new());
        let manager = gated_manager(&directory);
        manager.handle("e2", &Operation::Set, &Fields::new()).unwrap();

        manager.with_handler(|h| {
            let writer = Arc::clone(&directory);
            std::thread::spawn(move || {
                writer.put("CONFIG_DB", "DEVICE_METADATA", "localhost", Value::mapping());
            })
            .join()
            .unwrap();
            assert!(h.applied.is_empty());
        });

        assert!(directory.available_deps(manager.deps()));
        assert_eq!(manager.pending_len(), 0);
        manager.with_handler(|h| assert_eq!(h.applied, vec!["e2"]));
    }

    #[test]
    fn test_deps_arriving_from_inside_the_handler_are_retried() {
        let directory = Arc::new(Directory::new());
        let manager = gated_manager(&directory);
        manager.handle("e1", &Operation::Set, &Fields::new()).unwrap();

        manager.with_handler(|_| {
            directory.put("CONFIG_DB", "DEVICE_METADATA", "localhost", Value::mapping());
        });

        assert_eq!(manager.pending_len(), 0);
        manager.with_handler(|h| assert_eq!(h.applied, vec!["e1"]));
    }

    #[test]
    fn test_delete_is_never_gated() {
        let directory = Arc::new(Directory::new());
        let manager = gated_manager(&directory);

        manager.handle("e1", &Operation::Del, &Fields::new()).unwrap();
        manager.with_handler(|h| assert_eq!(h.deleted, vec!["e1"]));
    }

    #[test]
    fn test_unknown_operation_is_rejected() {
        let directory = Arc::new(Directory::new());
        let manager = gated_manager(&directory);

        let op = Operation::from("HSET");
        let err = manager.handle("e1", &op, &Fields::new()).unwrap_err();
        assert!(matches!(err, ManagerError::InvalidOperation { .. }));
        assert_eq!(manager.pending_len(), 0);
        manager.with_handler(|h| {
            assert!(h.calls.is_empty());
            assert!(h.deleted.is_empty());
        });
    }

    #[test]
    fn test_operation_parsing() {
        assert_eq!(Operation::from("SET"), Operation::Set);
        assert_eq!(Operation::from("DEL"), Operation::Del);
        assert_eq!(
            Operation::from("bogus"),
            Operation::Unknown("bogus".to_string())
        );
        assert_eq!(Operation::Set.to_string(), "SET");
    }

    #[test]
    fn test_dropped_manager_unsubscribes_silently() {
        let directory = Arc::new(Directory::new());
        let manager = gated_manager(&directory);
        drop(manager);

        // The weak callback must not panic once the manager is gone.
        directory.put("CONFIG_DB", "DEVICE_METADATA", "localhost", Value::mapping());
    }
}
