//! # switchyard-core
//!
//! In-process event router for the Switchyard realtime relay.
//!
//! Producers publish payloads addressed by a numeric [`RouteId`]; consumers
//! subscribe to a route and read from their own bounded [`Subscription`]
//! buffer. Delivery never blocks the publisher: when a subscriber's buffer is
//! full the payload is dropped for that subscriber only.
//!
//! - **Router** - façade owning the registry and the buffer capacity
//! - **Registry** - lock-striped map of route id to live subscriptions
//! - **Subscription** - per-subscriber bounded receive endpoint
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  publish(id, x)  ┌─────────────┐  try_send  ┌──────────────┐
//! │  Producers  │─────────────────▶│   Router    │───────────▶│ Subscription │
//! └─────────────┘                  └─────────────┘            └──────────────┘
//!                                         │
//!                                         ▼
//!                                  ┌─────────────┐
//!                                  │  Registry   │
//!                                  └─────────────┘
//! ```
//!
//! ```rust
//! use switchyard_core::Router;
//!
//! let router = Router::new(2).unwrap();
//! let mut sub = router.subscribe(0);
//! router.publish(0, "inactive");
//! assert_eq!(sub.try_recv().unwrap(), "inactive");
//! router.unsubscribe(&sub);
//! ```

mod registry;
pub mod router;
pub mod subscription;

/// Application-defined partition key for subscribers and publishers.
pub type RouteId = u64;

pub use router::{
    Router, RouterConfig, RouterError, RouterStats, DEFAULT_BUFFER_CAPACITY, MAX_BUFFER_CAPACITY,
};
pub use subscription::{Recv, Subscription, SubscriptionId, SubscriptionKey, TryRecvError};
