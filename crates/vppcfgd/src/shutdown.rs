//! Cooperative shutdown.
//!
//! The runner checks a shared flag between ticks; SIGINT and SIGTERM set it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;

/// Cooperative stop flag shared between the signal handler and the runner.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every holder to stop.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Cancels `token` on SIGINT or SIGTERM.
pub fn install_signal_handler(token: &ShutdownToken) -> Result<(), ctrlc::Error> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, stopping...");
        token.cancel();
    })
}
