//! Shared fixtures for the Switchyard benchmarks.

use switchyard_core::{RouteId, Router, Subscription};

/// Percentage of routes that get a subscriber in [`sparse_router`].
pub const HIT_RATIO: u64 = 50;

/// Small deterministic xorshift generator, so runs are comparable.
#[derive(Debug, Clone)]
pub struct XorShift(u64);

impl XorShift {
    /// Create a generator. A zero seed is replaced with a fixed constant.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self(if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed })
    }

    /// Next value in `0..bound`, or `0` when `bound` is zero.
    pub fn next_below(&mut self, bound: u64) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x.checked_rem(bound).unwrap_or(0)
    }
}

/// A router with buffer capacity 1 over `routes` route ids, where roughly
/// [`HIT_RATIO`] percent of the ids have one subscriber.
///
/// Slot `i` holds the subscription for route `i`, if any.
#[must_use]
pub fn sparse_router(routes: u64) -> (Router<u64>, Vec<Option<Subscription<u64>>>) {
    let router = Router::new(1).expect("capacity 1 is valid");
    let mut rng = XorShift::new(routes);
    let subs = (0..routes)
        .map(|route: RouteId| (rng.next_below(100) < HIT_RATIO).then(|| router.subscribe(route)))
        .collect();
    (router, subs)
}

/// Publish `count` payloads to random routes of a [`sparse_router`],
/// draining the target's buffer after each publish when it has one.
///
/// Does nothing when `subs` is empty.
pub fn publish_random(
    router: &Router<u64>,
    subs: &mut [Option<Subscription<u64>>],
    rng: &mut XorShift,
    count: u64,
) {
    if subs.is_empty() {
        return;
    }
    let routes = subs.len() as u64;
    for i in 0..count {
        let route = rng.next_below(routes);
        router.publish(route, i);
        if let Some(sub) = subs[route as usize].as_mut() {
            let _ = sub.try_recv();
        }
    }
}
