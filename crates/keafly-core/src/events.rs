// ── Event center ──
//
// Append-only event stream: every event is stored, then broadcast to
// whoever is subscribed. Any number of producers may emit concurrently.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::model::{Event, EventLevel, NewEvent};
use crate::store::Store;

const EVENT_CHANNEL_SIZE: usize = 256;

pub struct EventCenter {
    store: Arc<dyn Store>,
    sender: broadcast::Sender<Arc<Event>>,
}

impl EventCenter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self { store, sender }
    }

    /// Persist and broadcast one event. Storage failures are logged and
    /// the event is dropped.
    pub async fn emit(&self, event: NewEvent) -> Option<Arc<Event>> {
        match self.store.add_event(event).await {
            Ok(stored) => {
                match stored.level {
                    EventLevel::Info => info!(event = %stored.text, "event"),
                    EventLevel::Warning | EventLevel::Error => {
                        warn!(event = %stored.text, level = %stored.level, "event");
                    }
                }
                let stored = Arc::new(stored);
                // No subscribers is fine.
                let _ = self.sender.send(Arc::clone(&stored));
                Some(stored)
            }
            Err(e) => {
                warn!(error = %e, "failed to store event");
                None
            }
        }
    }

    pub async fn emit_all(&self, events: Vec<NewEvent>) {
        for event in events {
            self.emit(event).await;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Event>> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn events_are_stored_and_broadcast() {
        let store = Arc::new(MemoryStore::new());
        let center = EventCenter::new(store.clone());
        let mut rx = center.subscribe();

        center
            .emit_all(vec![NewEvent::info("first"), NewEvent::warning("second")])
            .await;

        assert_eq!(rx.recv().await.unwrap().text, "first");
        assert_eq!(rx.recv().await.unwrap().level, EventLevel::Warning);
        let stored = store.get_events(10).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].text, "second");
    }
}
