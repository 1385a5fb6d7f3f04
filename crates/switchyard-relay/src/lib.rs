//! # switchyard-relay
//!
//! Streaming relay for the Switchyard event router.
//!
//! A relay takes a [`Streamer`] (a live source of payloads, typically one
//! route's subscription) and pushes every payload to a websocket sink as a
//! JSON text frame. When the source stays silent for the keepalive interval a
//! keepalive payload is written instead, so idle connections stay open.
//!
//! ```rust,ignore
//! use switchyard_relay::{relay, RelayConfig, RouteStreamer};
//!
//! let mut streamer = RouteStreamer::new(router, route_id);
//! let report = relay(&mut streamer, &mut sink, &RelayConfig::default(), closed).await?;
//! ```

pub mod streamer;
pub mod traits;
pub mod websocket;

pub use streamer::RouteStreamer;
pub use traits::{default_keepalive, RelayError, Streamer};
pub use websocket::{relay, RelayConfig, RelayExit, RelayReport, DEFAULT_KEEPALIVE_INTERVAL};
