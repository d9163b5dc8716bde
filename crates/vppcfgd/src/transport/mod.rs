//! Delivery of table change events to the runner.
//!
//! The runner only sees the [`EventSource`] trait. Two sources exist: an
//! in-process channel (tests, embedding) and a directory of JSON table
//! dumps watched for changes (the daemon's default).

pub mod channel;
pub mod file_table;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::directory::SlotId;
use crate::manager::{Fields, Operation};

pub use channel::{channel, ChannelPublisher, ChannelSource};
pub use file_table::{diff_tables, FileTableSource, Table};

/// One change to one table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Table the entry belongs to.
    pub slot: SlotId,
    /// Entry key inside the table.
    pub key: String,
    pub op: Operation,
    /// New field values; empty for `DEL`.
    pub fields: Fields,
}

impl ChangeEvent {
    /// A `SET` of `key`.
    pub fn set(slot: SlotId, key: impl Into<String>, fields: Fields) -> Self {
        Self {
            slot,
            key: key.into(),
            op: Operation::Set,
            fields,
        }
    }

    /// A `DEL` of `key`.
    pub fn del(slot: SlotId, key: impl Into<String>) -> Self {
        Self {
            slot,
            key: key.into(),
            op: Operation::Del,
            fields: Fields::new(),
        }
    }
}

/// Failures of an event source. Any of them stops the runner.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Event channel disconnected")]
    Disconnected,

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Failed to prepare table directory '{path}': {source}")]
    TableDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A push-based stream of change events for a set of subscribed slots.
///
/// Within one slot, events come out in the order they were produced.
pub trait EventSource: Send {
    /// Starts delivering events for `slot`.
    fn subscribe(&mut self, slot: &SlotId) -> Result<(), TransportError>;

    /// Blocks up to `timeout` for the next event. `Ok(None)` means the
    /// timeout elapsed.
    fn poll(&mut self, timeout: Duration) -> Result<Option<ChangeEvent>, TransportError>;

    /// Returns an already-queued event without blocking.
    fn try_next(&mut self) -> Result<Option<ChangeEvent>, TransportError>;
}
