//! Fan-out of scan state snapshots to live observers.

use std::collections::HashMap;
use std::future::poll_fn;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::Stream;
use uuid::Uuid;

use crate::types::{ProgressMessage, ScanState};

/// Newest state that did not fit into a full queue. Older overflow is replaced.
type Overflow = Arc<Mutex<Option<ScanState>>>;

struct Observer {
    tx: mpsc::Sender<ProgressMessage>,
    overflow: Overflow,
}

type Registry = Arc<Mutex<HashMap<Uuid, Observer>>>;

/// Registry of connected observers.
///
/// Each observer owns a bounded queue. A slow observer is never dropped: once
/// its queue is full, further states collapse into one overflow slot holding
/// the newest state, delivered after the queue drains. Only a closed queue
/// removes an observer.
#[derive(Clone)]
pub struct ProgressBroadcaster {
    observers: Registry,
    capacity: usize,
}

impl ProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self { observers: Arc::new(Mutex::new(HashMap::new())), capacity: capacity.max(2) }
    }

    /// Registers a new observer. Its stream starts with a connection ack,
    /// followed by the state returned from `current` if there is one.
    ///
    /// `current` runs under the registry lock, so no broadcast can slip in
    /// between reading the state and joining the registry.
    pub fn register<F>(&self, current: F) -> Subscription
    where
        F: FnOnce() -> Option<ScanState>,
    {
        let client_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.capacity);
        let overflow: Overflow = Arc::new(Mutex::new(None));
        // Queue is fresh and capacity >= 2, both sends succeed
        let _ = tx.try_send(ProgressMessage::Connected { client_id });
        match self.observers.lock() {
            Ok(mut g) => {
                if let Some(state) = current() {
                    let _ = tx.try_send(ProgressMessage::State(state));
                }
                g.insert(client_id, Observer { tx, overflow: Arc::clone(&overflow) });
            }
            Err(_) => tracing::error!("observer registry poisoned"),
        }
        tracing::debug!(client_id = %client_id, "progress observer connected");
        Subscription { client_id, rx, overflow, registry: Arc::downgrade(&self.observers) }
    }

    /// Pushes `state` to every observer. Returns the number of observers still
    /// registered afterwards.
    pub fn broadcast(&self, state: &ScanState) -> usize {
        let Ok(mut g) = self.observers.lock() else {
            return 0;
        };
        g.retain(|client_id, observer| {
            let Ok(mut slot) = observer.overflow.lock() else {
                return false;
            };
            // Keep order: once lagging, everything goes through the slot
            if slot.is_some() {
                *slot = Some(state.clone());
                return true;
            }
            match observer.tx.try_send(ProgressMessage::State(state.clone())) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(client_id = %client_id, "progress observer lagging, coalescing states");
                    *slot = Some(state.clone());
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(client_id = %client_id, "dropping disconnected progress observer");
                    false
                }
            }
        });
        g.len()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().map(|g| g.len()).unwrap_or(0)
    }
}

/// Message stream of one observer; unregisters itself when dropped.
pub struct Subscription {
    client_id: Uuid,
    rx: mpsc::Receiver<ProgressMessage>,
    overflow: Overflow,
    registry: Weak<Mutex<HashMap<Uuid, Observer>>>,
}

impl Subscription {
    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    pub async fn recv(&mut self) -> Option<ProgressMessage> {
        poll_fn(|cx| self.poll_message(cx)).await
    }

    /// Queue first, then the overflow slot. The slot lock is held across both
    /// so a concurrent broadcast cannot reorder them.
    fn poll_message(&mut self, cx: &mut Context<'_>) -> Poll<Option<ProgressMessage>> {
        let Ok(mut slot) = self.overflow.lock() else {
            return self.rx.poll_recv(cx);
        };
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(msg)) => Poll::Ready(Some(msg)),
            Poll::Ready(None) => Poll::Ready(slot.take().map(ProgressMessage::State)),
            Poll::Pending => match slot.take() {
                Some(state) => Poll::Ready(Some(ProgressMessage::State(state))),
                None => Poll::Pending,
            },
        }
    }
}

impl Stream for Subscription {
    type Item = ProgressMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.poll_message(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Ok(mut g) = registry.lock() {
                g.remove(&self.client_id);
            }
        }
        tracing::debug!(client_id = %self.client_id, "progress observer disconnected");
    }
}
