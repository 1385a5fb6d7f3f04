//! Subscription handles.
//!
//! A [`Subscription`] is the consuming end of one subscriber's bounded
//! buffer. The producing end is held by the router's registry until the
//! subscription is released, after which the handle drains whatever is still
//! buffered and then reports closed.

use crate::RouteId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

pub use tokio::sync::mpsc::error::TryRecvError;

/// Identifier of a subscription, unique within one router.
pub type SubscriptionId = u64;

/// Source of router instance numbers, unique for the lifetime of the process.
static ROUTER_INSTANCE: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_router_instance() -> u64 {
    ROUTER_INSTANCE.fetch_add(1, Ordering::Relaxed)
}

/// Opaque token identifying a subscription.
///
/// Carries the owning router's instance number, so a key minted by one
/// router never matches an entry in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    router: u64,
    route: RouteId,
    id: SubscriptionId,
}

impl SubscriptionKey {
    pub(crate) fn new(router: u64, route: RouteId, id: SubscriptionId) -> Self {
        Self { router, route, id }
    }

    /// The route this subscription is bound to.
    #[must_use]
    pub fn route(&self) -> RouteId {
        self.route
    }

    /// The subscription id within its router.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) fn router(&self) -> u64 {
        self.router
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub_{}_{}_{}", self.router, self.route, self.id)
    }
}

/// Outcome of a bounded wait on a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recv<T> {
    /// A payload arrived in time.
    Payload(T),
    /// Nothing arrived before the timeout elapsed.
    TimedOut,
    /// The subscription was released and its buffer is drained.
    Closed,
}

/// A subscriber's bounded receive endpoint, bound to one route for life.
pub struct Subscription<T> {
    key: SubscriptionKey,
    receiver: mpsc::Receiver<T>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(key: SubscriptionKey, receiver: mpsc::Receiver<T>) -> Self {
        Self { key, receiver }
    }

    /// Token used to release this subscription.
    #[must_use]
    pub fn key(&self) -> SubscriptionKey {
        self.key
    }

    /// The route this subscription is bound to.
    #[must_use]
    pub fn route(&self) -> RouteId {
        self.key.route
    }

    /// Wait for the next payload.
    ///
    /// Returns `None` once the subscription has been released and every
    /// buffered payload has been read.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Take the next buffered payload without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`TryRecvError::Empty`] if nothing is buffered, or
    /// [`TryRecvError::Disconnected`] once released and drained.
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Blocking variant of [`recv`](Self::recv) for consumers outside an
    /// async runtime.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_recv(&mut self) -> Option<T> {
        self.receiver.blocking_recv()
    }

    /// Wait for the next payload for at most `timeout`.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Recv<T> {
        match tokio::time::timeout(timeout, self.receiver.recv()).await {
            Ok(Some(payload)) => Recv::Payload(payload),
            Ok(None) => Recv::Closed,
            Err(_) => Recv::TimedOut,
        }
    }

    /// Number of payloads currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Whether the buffer is currently empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("buffered", &self.receiver.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(capacity: usize) -> (mpsc::Sender<u32>, Subscription<u32>) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Subscription::new(SubscriptionKey::new(0, 7, 1), rx))
    }

    #[test]
    fn test_key_accessors() {
        let key = SubscriptionKey::new(3, 42, 9);
        assert_eq!(key.route(), 42);
        assert_eq!(key.id(), 9);
        assert_eq!(key.to_string(), "sub_3_42_9");
    }

    #[test]
    fn test_router_instances_are_unique() {
        let a = next_router_instance();
        let b = next_router_instance();
        assert_ne!(a, b);
    }

    #[test]
    fn test_try_recv_and_len() {
        let (tx, mut sub) = pair(2);
        assert!(sub.is_empty());
        assert!(matches!(sub.try_recv(), Err(TryRecvError::Empty)));

        tx.try_send(1).unwrap();
        assert_eq!(sub.len(), 1);
        assert_eq!(sub.try_recv().unwrap(), 1);

        drop(tx);
        assert!(matches!(sub.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[tokio::test]
    async fn test_buffered_payloads_survive_release() {
        let (tx, mut sub) = pair(2);
        tx.try_send(1).unwrap();
        tx.try_send(2).unwrap();
        drop(tx);

        assert_eq!(sub.recv().await, Some(1));
        assert_eq!(sub.recv().await, Some(2));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_timeout() {
        let (tx, mut sub) = pair(1);

        assert_eq!(sub.recv_timeout(Duration::from_secs(1)).await, Recv::TimedOut);

        tx.try_send(5).unwrap();
        assert_eq!(
            sub.recv_timeout(Duration::from_secs(1)).await,
            Recv::Payload(5)
        );

        drop(tx);
        assert_eq!(sub.recv_timeout(Duration::from_secs(1)).await, Recv::Closed);
    }

    #[test]
    fn test_blocking_recv_from_thread() {
        let (tx, mut sub) = pair(1);
        let reader = std::thread::spawn(move || sub.blocking_recv());
        tx.blocking_send(11).unwrap();
        assert_eq!(reader.join().unwrap(), Some(11));
    }
}
