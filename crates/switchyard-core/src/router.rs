//! Event router for Switchyard.
//!
//! The router owns the registry and fans published payloads out to every
//! subscription registered under the target route.

use crate::registry::Registry;
use crate::subscription::{next_router_instance, Subscription, SubscriptionId, SubscriptionKey};
use crate::RouteId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, trace};

/// Default per-subscription buffer capacity.
pub const DEFAULT_BUFFER_CAPACITY: usize = 16;

/// Largest per-subscription buffer capacity a bounded channel can hold.
pub const MAX_BUFFER_CAPACITY: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Router errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// Buffer capacity must be in `1..=MAX_BUFFER_CAPACITY`.
    #[error("Invalid buffer capacity: {0} (must be between 1 and {max})", max = MAX_BUFFER_CAPACITY)]
    InvalidCapacity(usize),

    /// Shard amount must be a power of two greater than one.
    #[error("Invalid shard amount: {0} (must be a power of two greater than one)")]
    InvalidShardAmount(usize),
}

/// Router configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Buffer capacity of every subscription.
    pub buffer_capacity: usize,
    /// Number of registry lock stripes. `None` picks one from the available
    /// parallelism.
    pub shard_amount: Option<usize>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            shard_amount: None,
        }
    }
}

impl RouterConfig {
    /// Configuration with the given buffer capacity.
    #[must_use]
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            buffer_capacity,
            ..Self::default()
        }
    }

    /// Use a fixed number of registry shards.
    #[must_use]
    pub fn with_shard_amount(mut self, shard_amount: usize) -> Self {
        self.shard_amount = Some(shard_amount);
        self
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for a buffer capacity outside
    /// `1..=MAX_BUFFER_CAPACITY` or an unusable shard amount.
    pub fn validate(&self) -> Result<(), RouterError> {
        if !(1..=MAX_BUFFER_CAPACITY).contains(&self.buffer_capacity) {
            return Err(RouterError::InvalidCapacity(self.buffer_capacity));
        }
        if let Some(shards) = self.shard_amount {
            if shards < 2 || !shards.is_power_of_two() {
                return Err(RouterError::InvalidShardAmount(shards));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    pruned: AtomicU64,
}

/// The event router.
///
/// Any number of threads or tasks may subscribe, unsubscribe and publish
/// concurrently. No router operation waits on subscriber behavior.
pub struct Router<T> {
    instance: u64,
    registry: Registry<T>,
    next_id: AtomicU64,
    config: RouterConfig,
    counters: Counters,
}

impl<T> Router<T> {
    /// Create a router whose subscriptions buffer `buffer_capacity` payloads.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidCapacity`] if `buffer_capacity` is zero
    /// or above [`MAX_BUFFER_CAPACITY`].
    pub fn new(buffer_capacity: usize) -> Result<Self, RouterError> {
        Self::with_config(RouterConfig::new(buffer_capacity))
    }

    /// Create a router with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_config(config: RouterConfig) -> Result<Self, RouterError> {
        config.validate()?;
        info!("Creating router with config: {:?}", config);

        let registry = match config.shard_amount {
            Some(shards) => Registry::with_shard_amount(shards),
            None => Registry::new(),
        };

        Ok(Self {
            instance: next_router_instance(),
            registry,
            next_id: AtomicU64::new(0),
            config,
            counters: Counters::default(),
        })
    }

    /// The configuration this router was built with.
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Subscribe to `route`.
    ///
    /// The returned handle stays registered until passed to
    /// [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe(&self, route: RouteId) -> Subscription<T> {
        let (sender, receiver) = mpsc::channel(self.config.buffer_capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let key = SubscriptionKey::new(self.instance, route, id);

        self.registry.register(route, id, sender);

        debug!(
            route,
            subscription = id,
            subscribers = self.registry.subscriber_count(route),
            "Subscribed"
        );

        Subscription::new(key, receiver)
    }

    /// Release a subscription.
    ///
    /// Nothing more is delivered to the handle afterwards; payloads already
    /// buffered can still be read. Returns `false` for a handle that was
    /// already released or came from another router.
    pub fn unsubscribe(&self, subscription: &Subscription<T>) -> bool {
        self.unsubscribe_key(subscription.key())
    }

    /// Release a subscription by key. See [`unsubscribe`](Self::unsubscribe).
    pub fn unsubscribe_key(&self, key: SubscriptionKey) -> bool {
        if key.router() != self.instance {
            trace!(subscription = %key, "Ignoring key from another router");
            return false;
        }

        let removed = self.registry.unregister(key.route(), key.id());
        if removed {
            debug!(
                route = key.route(),
                subscription = key.id(),
                subscribers = self.registry.subscriber_count(key.route()),
                "Unsubscribed"
            );
        }
        removed
    }

    /// Remove subscriptions whose handles were dropped without being
    /// released. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let pruned = self.registry.prune_closed();
        self.counters
            .pruned
            .fetch_add(pruned as u64, Ordering::Relaxed);
        pruned
    }

    /// Check if any subscription is registered under `route`.
    #[must_use]
    pub fn route_exists(&self, route: RouteId) -> bool {
        self.registry.contains_route(route)
    }

    /// Number of subscriptions registered under `route`.
    #[must_use]
    pub fn subscriber_count(&self, route: RouteId) -> usize {
        self.registry.subscriber_count(route)
    }

    /// All routes with at least one subscription.
    #[must_use]
    pub fn route_ids(&self) -> Vec<RouteId> {
        self.registry.route_ids()
    }

    /// Get router statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            route_count: self.registry.route_count(),
            subscription_count: self.registry.subscription_count(),
            published: self.counters.published.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            pruned: self.counters.pruned.load(Ordering::Relaxed),
        }
    }
}

impl<T: Clone> Router<T> {
    /// Publish a payload to every subscription of `route`.
    ///
    /// Never blocks and never fails. A subscription whose buffer is full
    /// misses this payload; the others still receive it. Returns the number
    /// of subscriptions that accepted the payload.
    pub fn publish(&self, route: RouteId, payload: T) -> usize {
        self.counters.published.fetch_add(1, Ordering::Relaxed);

        let Some(snapshot) = self.registry.snapshot(route) else {
            trace!(route, "Publish to route without subscribers");
            return 0;
        };

        let mut delivered = 0usize;
        let mut dropped = 0usize;
        let mut abandoned: Vec<SubscriptionId> = Vec::new();

        // The last attempt takes the payload itself.
        let last = snapshot.len() - 1;
        let mut payload = Some(payload);

        for (n, (id, sender)) in snapshot.senders().enumerate() {
            let item = if n == last {
                payload.take()
            } else {
                payload.clone()
            };
            let Some(item) = item else { break };

            match sender.try_send(item) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    trace!(route, subscription = id, "Buffer full, payload dropped");
                }
                Err(TrySendError::Closed(_)) => abandoned.push(id),
            }
        }
        let fanout = snapshot.len();
        drop(snapshot);

        for id in abandoned {
            if self.registry.unregister(route, id) {
                self.counters.pruned.fetch_add(1, Ordering::Relaxed);
                debug!(route, subscription = id, "Pruned abandoned subscription");
            }
        }

        self.counters
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.counters
            .dropped
            .fetch_add(dropped as u64, Ordering::Relaxed);

        trace!(route, fanout, delivered, dropped, "Published");
        delivered
    }
}

impl<T> fmt::Debug for Router<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("instance", &self.instance)
            .field("config", &self.config)
            .field("routes", &self.registry.route_count())
            .finish()
    }
}

/// Router statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Number of routes with at least one subscription.
    pub route_count: usize,
    /// Total number of live subscriptions.
    pub subscription_count: usize,
    /// Publish calls since creation.
    pub published: u64,
    /// Payloads accepted by a subscription buffer.
    pub delivered: u64,
    /// Payloads discarded because a subscription buffer was full.
    pub dropped: u64,
    /// Subscriptions removed because their handle was dropped unreleased.
    pub pruned: u64,
}
