//! In-process event source.
//!
//! A crossbeam channel carries [`ChangeEvent`]s from publishers to the
//! runner. Events for slots that were never subscribed are dropped on
//! receipt.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::debug;

use super::{ChangeEvent, EventSource, TransportError};
use crate::directory::SlotId;
use crate::manager::Fields;

/// Creates a connected publisher/source pair.
pub fn channel() -> (ChannelPublisher, ChannelSource) {
    let (sender, receiver) = unbounded();
    (
        ChannelPublisher { sender },
        ChannelSource {
            receiver,
            subscribed: HashSet::new(),
        },
    )
}

/// Producer side. Cheap to clone and safe to move to other threads.
#[derive(Clone)]
pub struct ChannelPublisher {
    sender: Sender<ChangeEvent>,
}

impl ChannelPublisher {
    /// Sends one event. Fails once the source is gone.
    pub fn publish(&self, event: ChangeEvent) -> Result<(), TransportError> {
        self.sender
            .send(event)
            .map_err(|_| TransportError::Disconnected)
    }

    /// Publishes a `SET` of `key` with `fields`.
    pub fn set(&self, slot: &SlotId, key: &str, fields: Fields) -> Result<(), TransportError> {
        self.publish(ChangeEvent::set(slot.clone(), key, fields))
    }

    /// Publishes a `DEL` of `key`.
    pub fn del(&self, slot: &SlotId, key: &str) -> Result<(), TransportError> {
        self.publish(ChangeEvent::del(slot.clone(), key))
    }
}

/// Consumer side handed to the runner.
pub struct ChannelSource {
    receiver: Receiver<ChangeEvent>,
    subscribed: HashSet<SlotId>,
}

impl ChannelSource {
    fn accept(&self, event: &ChangeEvent) -> bool {
        if self.subscribed.contains(&event.slot) {
            return true;
        }
        debug!(
            "Dropping event for unsubscribed slot '{}' (key '{}')",
            event.slot, event.key
        );
        false
    }
}

impl EventSource for ChannelSource {
    fn subscribe(&mut self, slot: &SlotId) -> Result<(), TransportError> {
        self.subscribed.insert(slot.clone());
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<ChangeEvent>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(event) if self.accept(&event) => return Ok(Some(event)),
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Disconnected),
            }
        }
    }

    /// A disconnected channel ends the drain; the next `poll` reports it.
    fn try_next(&mut self) -> Result<Option<ChangeEvent>, TransportError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accept(&event) => return Ok(Some(event)),
                Ok(_) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return Ok(None),
            }
        }
    }
}
