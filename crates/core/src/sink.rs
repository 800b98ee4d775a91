//! Event sink — queue-backed fan-out from the controller to consumers.
//!
//! One bounded queue per session; a drain task writes each event to the
//! durable store and republishes it on a broadcast channel for websocket
//! subscribers. The producer never blocks: when the queue is full or its
//! drain task is gone, the event is appended to the store directly and the
//! remote consumer is treated as detached. Delivery to remotes is
//! at-least-once; they must tolerate duplicates.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use axon_domain::{Event, State};
use axon_sessions::SessionStore;

#[derive(Clone)]
pub struct EventSink {
    session_id: String,
    store: Arc<SessionStore>,
    queue: mpsc::Sender<Event>,
    remote: broadcast::Sender<Event>,
}

impl EventSink {
    /// Build a sink and spawn its drain task.
    pub fn new(
        session_id: impl Into<String>,
        store: Arc<SessionStore>,
        remote: broadcast::Sender<Event>,
        capacity: usize,
    ) -> Self {
        let session_id = session_id.into();
        let (queue, rx) = mpsc::channel::<Event>(capacity.max(1));

        let drain_store = store.clone();
        let drain_remote = remote.clone();
        let drain_session = session_id.clone();
        tokio::spawn(async move {
            drain(drain_session, drain_store, drain_remote, rx).await;
        });

        Self {
            session_id,
            store,
            queue,
            remote,
        }
    }

    /// Publish an event: durable append plus remote fan-out, never blocking
    /// the producer.
    pub fn publish(&self, event: &Event) {
        match self.queue.try_send(event.clone()) {
            Ok(()) => {}
            Err(reason) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    event_id = event.id,
                    reason = %reason,
                    "event queue unavailable, appending directly"
                );
                if let Err(e) = self.store.append(&self.session_id, event) {
                    tracing::error!(
                        session_id = %self.session_id,
                        event_id = event.id,
                        error = %e,
                        "failed to persist event"
                    );
                }
                let _ = self.remote.send(event.clone());
            }
        }
    }

    /// Push an event to remote observers without persisting it (progress
    /// notifications like agent-state changes).
    pub fn publish_transient(&self, event: &Event) {
        let _ = self.remote.send(event.clone());
    }

    /// Checkpoint the session state (after each observation).
    pub fn checkpoint(&self, state: &State) {
        if let Err(e) = self.store.save_state(&self.session_id, state) {
            tracing::warn!(
                session_id = %self.session_id,
                error = %e,
                "failed to checkpoint session state"
            );
        }
    }

    /// Subscribe to the live event feed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.remote.subscribe()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Drain loop: FIFO per session; a slow or failed remote consumer never
/// stalls persistence.
async fn drain(
    session_id: String,
    store: Arc<SessionStore>,
    remote: broadcast::Sender<Event>,
    mut rx: mpsc::Receiver<Event>,
) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = store.append(&session_id, &event) {
            tracing::error!(
                session_id = %session_id,
                event_id = event.id,
                error = %e,
                "failed to persist event"
            );
        }
        // No receivers is fine; the session has no remote observer.
        let _ = remote.send(event);
    }
    tracing::debug!(session_id = %session_id, "event sink drained");
}
