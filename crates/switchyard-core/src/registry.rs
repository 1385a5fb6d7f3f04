//! Route registry.
//!
//! Maps each live route id to the producing ends of the subscriptions
//! registered under it. The map is lock-striped, so mutation of one route
//! only contends with routes hashed to the same shard.

use crate::subscription::SubscriptionId;
use crate::RouteId;
use dashmap::mapref::one::Ref;
use dashmap::DashMap;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Subscriptions registered under one route.
pub(crate) struct RouteEntry<T> {
    senders: HashMap<SubscriptionId, mpsc::Sender<T>>,
}

impl<T> RouteEntry<T> {
    fn new() -> Self {
        Self {
            senders: HashMap::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    fn len(&self) -> usize {
        self.senders.len()
    }
}

/// Consistent view of one route's subscriptions, held for one delivery pass.
///
/// Registration and removal on the same shard wait until the snapshot is
/// dropped. Do not call back into the registry while holding one.
pub(crate) struct Snapshot<'a, T> {
    entry: Ref<'a, RouteId, RouteEntry<T>>,
}

impl<T> Snapshot<'_, T> {
    pub(crate) fn senders(&self) -> impl Iterator<Item = (SubscriptionId, &mpsc::Sender<T>)> {
        self.entry.senders.iter().map(|(id, tx)| (*id, tx))
    }

    pub(crate) fn len(&self) -> usize {
        self.entry.len()
    }
}

/// Thread-safe route id to subscription set mapping.
pub(crate) struct Registry<T> {
    routes: DashMap<RouteId, RouteEntry<T>>,
}

impl<T> Registry<T> {
    /// Create a registry with the default number of shards.
    pub(crate) fn new() -> Self {
        Self {
            routes: DashMap::new(),
        }
    }

    /// Create a registry with a fixed number of shards.
    ///
    /// `shard_amount` must be a power of two greater than one.
    pub(crate) fn with_shard_amount(shard_amount: usize) -> Self {
        Self {
            routes: DashMap::with_shard_amount(shard_amount),
        }
    }

    /// Add a subscription under `route`, creating the entry if absent.
    pub(crate) fn register(&self, route: RouteId, id: SubscriptionId, sender: mpsc::Sender<T>) {
        let mut entry = self.routes.entry(route).or_insert_with(|| {
            trace!(route, "Creating route entry");
            RouteEntry::new()
        });
        entry.senders.insert(id, sender);
    }

    /// Remove a subscription from `route`.
    ///
    /// Returns `true` if it was registered. An entry left empty is reclaimed
    /// before returning.
    pub(crate) fn unregister(&self, route: RouteId, id: SubscriptionId) -> bool {
        let (removed, now_empty) = match self.routes.get_mut(&route) {
            Some(mut entry) => {
                let removed = entry.senders.remove(&id).is_some();
                (removed, entry.is_empty())
            }
            None => return false,
        };

        if now_empty {
            // Re-checked under the shard lock: a register that slipped in
            // between keeps the entry alive.
            if self
                .routes
                .remove_if(&route, |_, entry| entry.is_empty())
                .is_some()
            {
                debug!(route, "Reclaimed empty route entry");
            }
        }

        removed
    }

    /// Current subscriptions of `route`, or `None` if the route has none.
    pub(crate) fn snapshot(&self, route: RouteId) -> Option<Snapshot<'_, T>> {
        self.routes
            .get(&route)
            .filter(|entry| !entry.is_empty())
            .map(|entry| Snapshot { entry })
    }

    /// Drop every subscription whose consumer has gone away without being
    /// released, then reclaim emptied entries.
    ///
    /// Returns the number of subscriptions removed.
    pub(crate) fn prune_closed(&self) -> usize {
        let mut pruned = 0;
        self.routes.retain(|route, entry| {
            let before = entry.len();
            entry.senders.retain(|_, tx| !tx.is_closed());
            let removed = before - entry.len();
            if removed > 0 {
                debug!(route = *route, removed, "Pruned closed subscriptions");
            }
            pruned += removed;
            !entry.is_empty()
        });
        pruned
    }

    pub(crate) fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub(crate) fn subscription_count(&self) -> usize {
        self.routes.iter().map(|entry| entry.len()).sum()
    }

    pub(crate) fn subscriber_count(&self, route: RouteId) -> usize {
        self.routes.get(&route).map(|entry| entry.len()).unwrap_or(0)
    }

    pub(crate) fn contains_route(&self, route: RouteId) -> bool {
        self.routes.contains_key(&route)
    }

    pub(crate) fn route_ids(&self) -> Vec<RouteId> {
        self.routes.iter().map(|entry| *entry.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_register_unregister() {
        let registry = Registry::<u32>::new();
        let (tx1, _rx1) = mpsc::channel(1);
        let (tx2, _rx2) = mpsc::channel(1);

        registry.register(5, 1, tx1);
        registry.register(5, 2, tx2);
        assert_eq!(registry.subscriber_count(5), 2);
        assert_eq!(registry.route_count(), 1);

        assert!(registry.unregister(5, 1));
        assert_eq!(registry.subscriber_count(5), 1);
        assert!(registry.contains_route(5));

        // Unknown id, unknown route
        assert!(!registry.unregister(5, 1));
        assert!(!registry.unregister(6, 2));

        assert!(registry.unregister(5, 2));
        assert!(!registry.contains_route(5));
        assert_eq!(registry.route_count(), 0);
    }

    #[test]
    fn test_snapshot_of_absent_route() {
        let registry = Registry::<u32>::new();
        assert!(registry.snapshot(1).is_none());
    }

    #[test]
    fn test_snapshot_lists_senders() {
        let registry = Registry::<u32>::new();
        let (tx1, _rx1) = mpsc::channel(1);
        let (tx2, _rx2) = mpsc::channel(1);
        registry.register(3, 10, tx1);
        registry.register(3, 11, tx2);

        let snapshot = registry.snapshot(3).unwrap();
        assert_eq!(snapshot.len(), 2);
        let mut ids: Vec<_> = snapshot.senders().map(|(id, _)| id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![10, 11]);
    }

    #[test]
    fn test_prune_closed() {
        let registry = Registry::<u32>::new();
        let (tx1, rx1) = mpsc::channel(1);
        let (tx2, _rx2) = mpsc::channel(1);
        let (tx3, rx3) = mpsc::channel(1);
        registry.register(1, 1, tx1);
        registry.register(1, 2, tx2);
        registry.register(2, 3, tx3);

        drop(rx1);
        drop(rx3);

        assert_eq!(registry.prune_closed(), 2);
        assert_eq!(registry.subscriber_count(1), 1);
        assert!(!registry.contains_route(2));
        assert_eq!(registry.route_ids(), vec![1]);
    }

    #[test]
    fn test_custom_shard_amount() {
        let registry = Registry::<u32>::with_shard_amount(4);
        let (tx, _rx) = mpsc::channel(1);
        registry.register(9, 1, tx);
        assert_eq!(registry.subscription_count(), 1);
    }

    #[test]
    fn test_concurrent_churn_on_one_route_leaves_no_entry() {
        let registry = Arc::new(Registry::<u32>::new());
        let threads: Vec<_> = (0..8u64)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..500u64 {
                        let id = t * 1_000 + i;
                        let (tx, _rx) = mpsc::channel(1);
                        registry.register(77, id, tx);
                        assert!(registry.unregister(77, id));
                    }
                })
            })
            .collect();

        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(registry.subscription_count(), 0);
        assert!(!registry.contains_route(77));
    }
}
