//! Event subscriber registry.
//!
//! Editor events are pushed to every registered callback. A callback that
//! returns an error or panics is logged and skipped; the remaining
//! subscribers still see the event.

use crate::domain::messages::EventEnvelope;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

/// Error type subscriber callbacks may return.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

/// Subscriber callback.
pub type EventCallback = dyn Fn(&EventEnvelope) -> Result<(), SubscriberError> + Send + Sync;

/// Subscription ID
pub type SubscriptionId = u64;

/// Registry of event callbacks.
pub struct EventSubscribers {
    callbacks: RwLock<BTreeMap<SubscriptionId, Arc<EventCallback>>>,
    id_counter: AtomicU64,
}

impl EventSubscribers {
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(BTreeMap::new()),
            id_counter: AtomicU64::new(1),
        }
    }

    /// Register a callback. The returned handle unsubscribes on drop.
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> EventSubscription
    where
        F: Fn(&EventEnvelope) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        let id = self.id_counter.fetch_add(1, Ordering::Relaxed);
        self.callbacks.write().insert(id, Arc::new(callback));
        debug!(subscription_id = id, "Created event subscription");

        EventSubscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.callbacks.write().remove(&id).is_some();
        if removed {
            debug!(subscription_id = id, "Removed event subscription");
        }
        removed
    }

    /// Deliver an event to every current subscriber.
    ///
    /// Returns the number of subscribers that handled it without failing.
    pub fn publish(&self, event: &EventEnvelope) -> usize {
        // Callbacks run outside the lock so they may (un)subscribe.
        let snapshot: Vec<(SubscriptionId, Arc<EventCallback>)> = self
            .callbacks
            .read()
            .iter()
            .map(|(id, cb)| (*id, Arc::clone(cb)))
            .collect();

        let mut delivered = 0;
        for (id, callback) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(
                        subscription_id = id,
                        event_type = %event.kind,
                        error = %e,
                        "Event subscriber failed"
                    );
                }
                Err(_) => {
                    error!(
                        subscription_id = id,
                        event_type = %event.kind,
                        "Event subscriber panicked"
                    );
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.callbacks.read().len()
    }
}

impl Default for EventSubscribers {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for a registered callback.
///
/// Dropping it (or calling [`dispose`](Self::dispose)) removes the callback.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct EventSubscription {
    id: SubscriptionId,
    registry: Weak<EventSubscribers>,
}

impl EventSubscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Unsubscribe now.
    pub fn dispose(self) {
        // Drop does the work.
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
    }
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription").field("id", &self.id).finish()
    }
}
