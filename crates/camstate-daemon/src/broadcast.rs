// crates/camstate-daemon/src/broadcast.rs
// ============================================================================
// Module: Client Broadcast
// Description: Fan-out of state changes to connected clients.
// Purpose: Deliver entry updates to every subscriber allowed to read them.
// Dependencies: camstate-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Transport framing is out of scope; a [`ClientBroadcaster`] receives
//! [`StateUpdate`] records and hands them to whatever carries them to
//! clients. [`BroadcastObserver`] is attached last to every entry and carries
//! the entry's read set so subscribers only see entries they may read.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::mpsc;

use camstate_core::CapabilitySet;
use camstate_core::ObserverError;
use camstate_core::StateChange;
use camstate_core::StateObserver;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Update sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    /// Entry name.
    pub key: String,
    /// New value as JSON.
    pub value: serde_json::Value,
    /// Pipeline sequence number of the change.
    pub sequence: u64,
    /// Capabilities allowed to read the entry.
    #[serde(skip)]
    pub readers: CapabilitySet,
}

/// Delivers updates to clients.
pub trait ClientBroadcaster: Send + Sync {
    /// Publishes one update.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError`] when publishing fails.
    fn broadcast(&self, update: &StateUpdate) -> Result<(), ObserverError>;
}

/// Broadcaster that discards updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBroadcaster;

impl ClientBroadcaster for NoopBroadcaster {
    fn broadcast(&self, _update: &StateUpdate) -> Result<(), ObserverError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Channel Broadcaster
// ============================================================================

/// In-process subscriber.
struct Subscriber {
    /// Capabilities of the subscribed client.
    capabilities: CapabilitySet,
    /// Delivery channel.
    sender: mpsc::Sender<StateUpdate>,
}

/// Broadcaster backed by in-process channels, one per subscriber.
/// Subscribers whose receiver was dropped are pruned on the next update.
#[derive(Default)]
pub struct ChannelBroadcaster {
    /// Live subscribers.
    subscribers: Mutex<Vec<Subscriber>>,
}

impl ChannelBroadcaster {
    /// Creates a broadcaster with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a client holding `capabilities`.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::Unavailable`] when the subscriber list is
    /// poisoned.
    pub fn subscribe(&self, capabilities: CapabilitySet) -> Result<mpsc::Receiver<StateUpdate>, ObserverError> {
        let (sender, receiver) = mpsc::channel();
        self.lock()?.push(Subscriber {
            capabilities,
            sender,
        });
        Ok(receiver)
    }

    /// Returns the number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().map_or(0, |subscribers| subscribers.len())
    }

    /// Locks the subscriber list.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Subscriber>>, ObserverError> {
        self.subscribers.lock().map_err(|_| ObserverError::Unavailable("subscriber list poisoned".to_string()))
    }
}

impl ClientBroadcaster for ChannelBroadcaster {
    fn broadcast(&self, update: &StateUpdate) -> Result<(), ObserverError> {
        let mut subscribers = self.lock()?;
        subscribers.retain(|subscriber| {
            if !subscriber.capabilities.intersects(update.readers) {
                return true;
            }
            subscriber.sender.send(update.clone()).is_ok()
        });
        Ok(())
    }
}

// ============================================================================
// SECTION: Observer
// ============================================================================

/// Observer publishing every change of one entry.
pub struct BroadcastObserver {
    /// Target broadcaster.
    broadcaster: Arc<dyn ClientBroadcaster>,
    /// Read set of the observed entry.
    readers: CapabilitySet,
}

impl BroadcastObserver {
    /// Creates an observer for an entry readable by `readers`.
    #[must_use]
    pub fn new(broadcaster: Arc<dyn ClientBroadcaster>, readers: CapabilitySet) -> Self {
        Self {
            broadcaster,
            readers,
        }
    }
}

impl StateObserver for BroadcastObserver {
    fn label(&self) -> &str {
        "client-broadcast"
    }

    fn on_change(&self, change: &StateChange) -> Result<(), ObserverError> {
        let value = change.new.to_json().map_err(|err| ObserverError::Failed(err.to_string()))?;
        self.broadcaster.broadcast(&StateUpdate {
            key: change.name.clone(),
            value,
            sequence: change.sequence,
            readers: self.readers,
        })
    }
}
