//! The daemon's event loop.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use indexmap::IndexMap;
use log::{debug, error, info, warn};
use thiserror::Error;
use tracing::info_span;

use crate::config::ConfigMgr;
use crate::directory::SlotId;
use crate::manager::EventHandler;
use crate::shutdown::ShutdownToken;
use crate::transport::{ChangeEvent, EventSource, TransportError};

/// How long one poll waits for the first event of a tick.
pub const SELECT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Errors that stop the loop.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),
}

/// What one iteration of the loop did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tick {
    /// Events drained and dispatched.
    pub events: usize,
    /// Whether a commit ran and succeeded.
    pub committed: bool,
    /// Whether the commit ran with no configuration update staged.
    pub without_update: bool,
}

/// Polls an [`EventSource`], fans events out to the registered managers and
/// commits the [`ConfigMgr`] once per batch.
pub struct Runner {
    cfg_mgr: Arc<Mutex<ConfigMgr>>,
    source: Box<dyn EventSource>,
    shutdown: ShutdownToken,
    poll_timeout: Duration,
    callbacks: IndexMap<SlotId, Vec<Arc<dyn EventHandler>>>,
}

impl Runner {
    /// Creates a runner with the default [`SELECT_TIMEOUT`].
    pub fn new(
        cfg_mgr: Arc<Mutex<ConfigMgr>>,
        source: Box<dyn EventSource>,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            cfg_mgr,
            source,
            shutdown,
            poll_timeout: SELECT_TIMEOUT,
            callbacks: IndexMap::new(),
        }
    }

    /// Overrides how long one poll waits.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Registers a manager. The source is subscribed to the manager's slot
    /// the first time that slot is seen; managers sharing a slot are called
    /// in registration order.
    pub fn add_manager(&mut self, manager: Arc<dyn EventHandler>) -> Result<(), RunnerError> {
        let slot = manager.slot().clone();
        if !self.callbacks.contains_key(&slot) {
            self.source.subscribe(&slot)?;
            debug!("Subscribed to '{}'", slot);
        }
        self.callbacks.entry(slot).or_default().push(manager);
        Ok(())
    }

    /// Runs until the shutdown token is cancelled or the transport fails.
    pub fn run(&mut self) -> Result<(), RunnerError> {
        info!(
            "Runner started with {} watched table(s)",
            self.callbacks.len()
        );
        while !self.shutdown.is_cancelled() {
            self.run_once()?;
        }
        info!("Runner stopped");
        Ok(())
    }

    /// Waits for events, dispatches every event that is ready and commits
    /// once if anything was dispatched.
    pub fn run_once(&mut self) -> Result<Tick, RunnerError> {
        let Some(first) = self.source.poll(self.poll_timeout)? else {
            return Ok(Tick::default());
        };

        let _span = info_span!("tick").entered();
        let mut events = 1;
        self.dispatch(&first);
        let mut last = first;
        while let Some(event) = self.source.try_next()? {
            self.dispatch(&event);
            events += 1;
            last = event;
        }

        let mut cfg_mgr = self.cfg_mgr.lock().unwrap_or_else(PoisonError::into_inner);
        let without_update = cfg_mgr.working_tree().is_none();
        if without_update {
            warn!(
                "No configuration update from {} event(s), last was {} {} '{}'; committing an empty tree",
                events, last.slot, last.op, last.key
            );
        }
        let committed = match cfg_mgr.commit() {
            Ok(_) => true,
            Err(e) => {
                error!("critical: commit was unsuccessful: {}", e);
                false
            }
        };
        Ok(Tick {
            events,
            committed,
            without_update,
        })
    }

    fn dispatch(&self, event: &ChangeEvent) {
        debug!(
            "Received message: {} {} {} {:?}",
            event.slot, event.op, event.key, event.fields
        );
        let Some(managers) = self.callbacks.get(&event.slot) else {
            debug!("No manager registered for '{}'", event.slot);
            return;
        };
        for manager in managers {
            if let Err(e) = manager.handle(&event.key, &event.op, &event.fields) {
                error!("{}: {}", manager.name(), e);
            }
        }
    }
}
