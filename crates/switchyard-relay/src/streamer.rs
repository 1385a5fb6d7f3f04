//! Streamer over a router route.

use crate::traits::{default_keepalive, RelayError, Streamer};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use switchyard_core::{RouteId, Router, Subscription};
use tracing::debug;

/// Relays everything published to one route.
///
/// `setup` subscribes and `cleanup` unsubscribes. Dropping the streamer also
/// releases the subscription, so an aborted relay does not leave it behind.
pub struct RouteStreamer<T> {
    router: Arc<Router<T>>,
    route: RouteId,
    keepalive: Option<serde_json::Value>,
    subscription: Option<Subscription<T>>,
}

impl<T> RouteStreamer<T> {
    /// Create a streamer for `route`.
    #[must_use]
    pub fn new(router: Arc<Router<T>>, route: RouteId) -> Self {
        Self {
            router,
            route,
            keepalive: Some(default_keepalive()),
            subscription: None,
        }
    }

    /// Replace the keepalive payload. `None` disables keepalives.
    #[must_use]
    pub fn with_keepalive(mut self, keepalive: Option<serde_json::Value>) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// The route being relayed.
    #[must_use]
    pub fn route(&self) -> RouteId {
        self.route
    }

    /// Whether the streamer currently holds a subscription.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    fn release(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.router.unsubscribe(&subscription);
            debug!(route = self.route, "Relay subscription released");
        }
    }
}

#[async_trait]
impl<T> Streamer for RouteStreamer<T>
where
    T: Serialize + Send + 'static,
{
    type Item = T;

    async fn setup(&mut self) -> Result<(), RelayError> {
        if self.subscription.is_none() {
            self.subscription = Some(self.router.subscribe(self.route));
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<T> {
        match self.subscription.as_mut() {
            Some(subscription) => subscription.recv().await,
            None => None,
        }
    }

    fn keepalive(&self) -> Option<serde_json::Value> {
        self.keepalive.clone()
    }

    fn cleanup(&mut self) {
        self.release();
    }
}

impl<T> Drop for RouteStreamer<T> {
    fn drop(&mut self) {
        self.release();
    }
}
