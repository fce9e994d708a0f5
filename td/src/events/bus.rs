//! Event Bus - broadcast channel between the orchestrator and its observers

use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::SyncEvent;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Fan-out of [`SyncEvent`]s to every subscriber
///
/// Closing the bus drops the sender: existing receivers drain what is
/// buffered and then see `Closed`, later subscribers get a closed receiver.
pub struct EventBus {
    tx: RwLock<Option<broadcast::Sender<SyncEvent>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx: RwLock::new(Some(tx)),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Fire-and-forget; dropped when nobody listens or the bus is closed
    pub fn emit(&self, event: SyncEvent) {
        debug!(event_type = event.event_type(), "EventBus::emit");
        let guard = self.tx.read().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = guard.as_ref() {
            // No subscribers is fine
            let _ = tx.send(event);
        }
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        debug!("EventBus::subscribe: new subscriber");
        let guard = self.tx.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                rx
            }
        }
    }

    /// Detach every subscriber
    pub fn close(&self) {
        debug!("EventBus::close: called");
        self.tx.write().unwrap_or_else(|e| e.into_inner()).take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.read().unwrap_or_else(|e| e.into_inner()).is_none()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(0, |tx| tx.receiver_count())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncState;
    use tokio::sync::broadcast::error::RecvError;

    fn state_event(version: u64) -> SyncEvent {
        SyncEvent::StateUpdated {
            state: SyncState {
                version,
                ..SyncState::default()
            },
        }
    }

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.emit(state_event(1));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "state:updated");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(state_event(7));
        assert_eq!(rx1.recv().await.unwrap(), state_event(7));
        assert_eq!(rx2.recv().await.unwrap(), state_event(7));
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::default();
        bus.emit(state_event(1));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_close_detaches_subscribers() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.emit(state_event(1));
        bus.close();

        assert!(bus.is_closed());
        assert_eq!(rx.recv().await.unwrap(), state_event(1));
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));

        bus.emit(state_event(2));
        let mut late = bus.subscribe();
        assert!(matches!(late.recv().await, Err(RecvError::Closed)));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
