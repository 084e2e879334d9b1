//! EventBus - publish/subscribe hub between Monitors, Tasks and observers.
//!
//! ```text
//! publish(event)
//!     │  (lock: clone snapshot Arc, unlock)
//!     ├──► [endpoint 1: bounded mpsc] ──► Subscription::recv()
//!     ├──► [endpoint 2: bounded mpsc] ──► Subscription::recv()
//!     └──► [endpoint N: bounded mpsc] ──► Subscription::recv()
//! ```
//!
//! Rules:
//! - `publish` never blocks and never fails: a full or closed endpoint drops
//!   the event for that endpoint only.
//! - Membership lives in a `HashMap` (O(1) subscribe/unsubscribe). Publish
//!   works on an immutable snapshot that is rebuilt only after membership
//!   changed, so delivery happens outside the lock.
//! - Per-endpoint FIFO: events from one publisher arrive in publish order.
//! - Dropping a `Subscription` unsubscribes it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::domain::Event;

/// Handle identifying one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Endpoint = (SubscriberId, mpsc::Sender<Arc<Event>>);

struct Members {
    endpoints: HashMap<SubscriberId, mpsc::Sender<Arc<Event>>>,
    /// Cached publish view; `None` after any membership change.
    snapshot: Option<Arc<[Endpoint]>>,
}

struct BusInner {
    capacity: usize,
    next_id: AtomicU64,
    members: Mutex<Members>,
}

impl BusInner {
    fn members(&self) -> MutexGuard<'_, Members> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: SubscriberId) -> bool {
        let mut members = self.members();
        let removed = members.endpoints.remove(&id).is_some();
        if removed {
            members.snapshot = None;
        }
        removed
    }
}

/// Cloneable handle to a shared bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// `capacity` is per endpoint (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                capacity: capacity.max(1),
                next_id: AtomicU64::new(1),
                members: Mutex::new(Members {
                    endpoints: HashMap::new(),
                    snapshot: None,
                }),
            }),
        }
    }

    /// Registers a new endpoint. It only receives events published afterwards.
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        {
            let mut members = self.inner.members();
            members.endpoints.insert(id, tx);
            members.snapshot = None;
        }
        tracing::trace!(subscriber = %id, "subscribed");
        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Removes an endpoint and closes it for further delivery. Idempotent.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.inner.remove(id) {
            tracing::trace!(subscriber = %id, "unsubscribed");
        }
    }

    /// Delivers `event` to every registered endpoint without waiting.
    ///
    /// Returns how many endpoints accepted it.
    pub fn publish(&self, event: Event) -> usize {
        let snapshot = {
            let mut guard = self.inner.members();
            let Members {
                endpoints,
                snapshot,
            } = &mut *guard;
            Arc::clone(snapshot.get_or_insert_with(|| {
                endpoints
                    .iter()
                    .map(|(id, tx)| (*id, tx.clone()))
                    .collect()
            }))
        };

        let event = Arc::new(event);
        let mut delivered = 0;
        for (id, tx) in snapshot.iter() {
            match tx.try_send(Arc::clone(&event)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::trace!(subscriber = %id, kind = event.kind(), "endpoint full, event dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::trace!(subscriber = %id, kind = event.kind(), "endpoint closed, event dropped");
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.members().endpoints.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Receiving side of one endpoint.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<Event>>,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next event; `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.rx.try_recv().ok()
    }

    /// Detach from the bus now. Already queued events can still be drained.
    pub fn unsubscribe(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.rx.close();
        self.unsubscribe();
    }
}
