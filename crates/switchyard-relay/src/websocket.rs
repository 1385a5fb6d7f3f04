//! WebSocket relay loop.
//!
//! Drives a [`Streamer`] into a websocket sink: each payload becomes one JSON
//! text frame, and a keepalive frame is written whenever the source has been
//! quiet for the configured interval.

use crate::traits::{RelayError, Streamer};
use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Default keepalive interval.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Idle time after which a keepalive payload is written.
    pub keepalive_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }
}

/// Why a relay stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayExit {
    /// The streamer ran out of payloads.
    SourceClosed,
    /// The client went away.
    PeerClosed,
}

/// Summary of a finished relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    /// Why the relay stopped.
    pub exit: RelayExit,
    /// Payload frames written.
    pub payloads: u64,
    /// Keepalive frames written.
    pub keepalives: u64,
}

enum Next<T> {
    Item(Option<T>),
    Idle,
    PeerClosed,
}

/// Relay payloads from `streamer` to `sink` until the source ends, the peer
/// goes away (`closed` resolves) or a write fails.
///
/// `cleanup` runs on every exit path once `setup` has succeeded.
///
/// # Errors
///
/// Returns an error if setup fails, a payload cannot be serialized, or the
/// sink rejects a frame.
pub async fn relay<S, W, C>(
    streamer: &mut S,
    sink: &mut W,
    config: &RelayConfig,
    closed: C,
) -> Result<RelayReport, RelayError>
where
    S: Streamer + ?Sized,
    W: Sink<Message> + Unpin,
    W::Error: fmt::Display,
    C: Future<Output = ()>,
{
    if let Err(e) = streamer.setup().await {
        warn!(error = %e, "Setup error");
        return Err(e);
    }

    let result = pump(streamer, sink, config, closed).await;
    streamer.cleanup();

    match &result {
        Ok(report) => debug!(
            exit = ?report.exit,
            payloads = report.payloads,
            keepalives = report.keepalives,
            "Relay finished"
        ),
        Err(e) => warn!(error = %e, "Relay aborted"),
    }
    result
}

async fn pump<S, W, C>(
    streamer: &mut S,
    sink: &mut W,
    config: &RelayConfig,
    closed: C,
) -> Result<RelayReport, RelayError>
where
    S: Streamer + ?Sized,
    W: Sink<Message> + Unpin,
    W::Error: fmt::Display,
    C: Future<Output = ()>,
{
    tokio::pin!(closed);
    let mut payloads = 0u64;
    let mut keepalives = 0u64;

    loop {
        let next = tokio::select! {
            biased;

            () = &mut closed => Next::PeerClosed,

            item = tokio::time::timeout(config.keepalive_interval, streamer.recv()) => {
                match item {
                    Ok(item) => Next::Item(item),
                    Err(_) => Next::Idle,
                }
            }
        };

        let text = match next {
            Next::Item(Some(item)) => {
                payloads += 1;
                serde_json::to_string(&item)?
            }
            Next::Item(None) => {
                return Ok(RelayReport {
                    exit: RelayExit::SourceClosed,
                    payloads,
                    keepalives,
                })
            }
            Next::PeerClosed => {
                return Ok(RelayReport {
                    exit: RelayExit::PeerClosed,
                    payloads,
                    keepalives,
                })
            }
            Next::Idle => match streamer.keepalive() {
                Some(keepalive) => {
                    trace!("Writing keepalive");
                    keepalives += 1;
                    serde_json::to_string(&keepalive)?
                }
                None => continue,
            },
        };

        if let Err(e) = sink.send(Message::Text(text)).await {
            warn!(error = %e, "Error writing. Exiting");
            return Err(RelayError::SendFailed(e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamer::RouteStreamer;
    use async_trait::async_trait;
    use std::sync::Arc;
    use switchyard_core::Router;
    use tokio::sync::{mpsc, oneshot};

    /// Yields a fixed list of payloads, then ends.
    struct ListStreamer {
        items: Vec<&'static str>,
        fail_setup: bool,
        cleanups: usize,
    }

    impl ListStreamer {
        fn new(items: Vec<&'static str>) -> Self {
            Self {
                items,
                fail_setup: false,
                cleanups: 0,
            }
        }
    }

    #[async_trait]
    impl Streamer for ListStreamer {
        type Item = &'static str;

        async fn setup(&mut self) -> Result<(), RelayError> {
            if self.fail_setup {
                return Err(RelayError::Setup("no such route".into()));
            }
            self.items.reverse();
            Ok(())
        }

        async fn recv(&mut self) -> Option<&'static str> {
            self.items.pop()
        }

        fn cleanup(&mut self) {
            self.cleanups += 1;
        }
    }

    type TestSink = std::pin::Pin<Box<dyn Sink<Message, Error = &'static str> + Send>>;

    fn channel_sink() -> (TestSink, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = futures_util::sink::unfold(tx, |tx, msg: Message| async move {
            tx.send(msg).map_err(|_| "receiver gone")?;
            Ok::<_, &'static str>(tx)
        });
        (Box::pin(sink), rx)
    }

    fn text(msg: Message) -> String {
        match msg {
            Message::Text(text) => text,
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_relay_until_source_closes() {
        let mut streamer = ListStreamer::new(vec!["foo", "bar"]);
        let (mut sink, mut rx) = channel_sink();

        let report = relay(
            &mut streamer,
            &mut sink,
            &RelayConfig::default(),
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(report.exit, RelayExit::SourceClosed);
        assert_eq!(report.payloads, 2);
        assert_eq!(text(rx.recv().await.unwrap()), r#""foo""#);
        assert_eq!(text(rx.recv().await.unwrap()), r#""bar""#);
        assert_eq!(streamer.cleanups, 1);
    }

    #[tokio::test]
    async fn test_relay_setup_failure_skips_cleanup() {
        let mut streamer = ListStreamer::new(vec!["foo"]);
        streamer.fail_setup = true;
        let (mut sink, mut rx) = channel_sink();

        let err = relay(
            &mut streamer,
            &mut sink,
            &RelayConfig::default(),
            std::future::pending(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RelayError::Setup(_)));
        assert_eq!(streamer.cleanups, 0);
        drop(sink);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_relay_write_error_runs_cleanup() {
        let mut streamer = ListStreamer::new(vec!["foo"]);
        let mut sink: TestSink = Box::pin(futures_util::sink::unfold(
            (),
            |(), _msg: Message| async { Err::<(), _>("broken pipe") },
        ));

        let err = relay(
            &mut streamer,
            &mut sink,
            &RelayConfig::default(),
            std::future::pending(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RelayError::SendFailed(ref msg) if msg == "broken pipe"));
        assert_eq!(streamer.cleanups, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_route_with_keepalive() {
        let router = Arc::new(Router::<String>::new(4).unwrap());
        let mut streamer = RouteStreamer::new(Arc::clone(&router), 3);
        let (mut sink, mut rx) = channel_sink();
        let (close_tx, close_rx) = oneshot::channel::<()>();
        let config = RelayConfig {
            keepalive_interval: Duration::from_secs(5),
        };

        let task = tokio::spawn(async move {
            let closed = async {
                let _ = close_rx.await;
            };
            relay(&mut streamer, &mut sink, &config, closed).await
        });

        // Nothing published yet: the first frame is a keepalive.
        assert_eq!(text(rx.recv().await.unwrap()), r#"{"keepAlive":true}"#);
        assert_eq!(router.subscriber_count(3), 1);

        assert_eq!(router.publish(3, "some data".to_string()), 1);
        assert_eq!(text(rx.recv().await.unwrap()), r#""some data""#);

        close_tx.send(()).unwrap();
        let report = task.await.unwrap().unwrap();
        assert_eq!(report.exit, RelayExit::PeerClosed);
        assert_eq!(report.payloads, 1);
        assert_eq!(report.keepalives, 1);
        assert!(!router.route_exists(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_without_keepalive_stays_quiet() {
        let router = Arc::new(Router::<u32>::new(1).unwrap());
        let mut streamer = RouteStreamer::new(Arc::clone(&router), 1).with_keepalive(None);
        let (mut sink, mut rx) = channel_sink();
        let config = RelayConfig {
            keepalive_interval: Duration::from_millis(10),
        };

        let closed = tokio::time::sleep(Duration::from_millis(100));
        let report = relay(&mut streamer, &mut sink, &config, closed)
            .await
            .unwrap();

        assert_eq!(report.exit, RelayExit::PeerClosed);
        assert_eq!(report.keepalives, 0);
        assert!(rx.try_recv().is_err());
    }
}
