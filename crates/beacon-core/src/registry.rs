//! Registry of live subscribers.
//!
//! Membership changes are single-entry operations on a sharded map, so a
//! broadcast snapshot sees each subscriber either fully registered or not at
//! all. Snapshots are cloned handles; no map lock is held while sending.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::subscriber::{Subscriber, SubscriberId};

/// The set of currently open subscribers.
#[derive(Debug)]
pub struct SubscriberRegistry {
    subscribers: DashMap<SubscriberId, Arc<Subscriber>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate the next subscriber id.
    pub fn next_id(&self) -> SubscriberId {
        SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Add a subscriber and open it. Returns the number of subscribers afterwards.
    pub fn register(&self, subscriber: Arc<Subscriber>) -> usize {
        let id = subscriber.id();
        subscriber.open();
        self.subscribers.insert(id, subscriber);
        let total = self.subscribers.len();
        info!(subscriber = %id, total, "Subscriber registered");
        total
    }

    /// Remove a subscriber.
    ///
    /// Removing an id that is not registered is a no-op and returns `None`.
    pub fn unregister(&self, id: SubscriberId) -> Option<Arc<Subscriber>> {
        let removed = self.subscribers.remove(&id).map(|(_, subscriber)| subscriber);
        if removed.is_some() {
            info!(subscriber = %id, total = self.subscribers.len(), "Subscriber unregistered");
        }
        removed
    }

    /// Remove a subscriber and tell its session to close.
    ///
    /// Returns `true` if this call removed it.
    pub fn evict(&self, id: SubscriberId) -> bool {
        match self.unregister(id) {
            Some(subscriber) => {
                debug!(subscriber = %id, "Evicting subscriber");
                subscriber.request_close();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn get(&self, id: SubscriberId) -> Option<Arc<Subscriber>> {
        self.subscribers.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.contains_key(&id)
    }

    /// Handles of every registered subscriber at this moment.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        self.subscribers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::SessionState;

    fn add(registry: &SubscriberRegistry) -> Arc<Subscriber> {
        let (subscriber, _outbox) = Subscriber::new(registry.next_id(), 8, None);
        registry.register(Arc::clone(&subscriber));
        subscriber
    }

    #[test]
    fn test_ids_increase() {
        let registry = SubscriberRegistry::new();
        let a = registry.next_id();
        let b = registry.next_id();
        let c = registry.next_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_register_unregister() {
        let registry = SubscriberRegistry::new();
        let sub = add(&registry);

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(sub.id()));
        assert!(registry.get(sub.id()).is_some());

        assert!(registry.unregister(sub.id()).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = SubscriberRegistry::new();
        let sub = add(&registry);

        assert!(registry.unregister(sub.id()).is_some());
        assert!(registry.unregister(sub.id()).is_none());
        assert!(!registry.evict(sub.id()));
    }

    #[test]
    fn test_evict_requests_close() {
        let registry = SubscriberRegistry::new();
        let sub = add(&registry);

        assert!(registry.evict(sub.id()));
        assert!(!registry.contains(sub.id()));
        assert_eq!(sub.state(), SessionState::Closing);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = SubscriberRegistry::new();
        let a = add(&registry);
        let _b = add(&registry);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);

        // Later changes do not affect a snapshot already taken.
        registry.unregister(a.id());
        let _c = add(&registry);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.len(), 2);
    }
}
