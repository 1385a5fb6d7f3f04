//! HTTP and websocket handlers for the Switchyard server.
//!
//! Clients open a websocket on a route to stream its events; producers POST
//! JSON payloads to the same path to publish them.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use switchyard_core::{RouteId, Router as EventRouter};
use switchyard_relay::{relay, RouteStreamer};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The event router.
    pub router: Arc<EventRouter<Value>>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    ///
    /// # Errors
    ///
    /// Returns an error if the router configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        let router = EventRouter::with_config(config.router_config())
            .context("Invalid router configuration")?;

        Ok(Self {
            router: Arc::new(router),
            config,
        })
    }
}

/// Build the HTTP application.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/routes/:route_id/events",
            get(ws_handler).post(publish_handler),
        )
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone())?);

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let sweeper = tokio::spawn(prune_loop(Arc::clone(&state)));

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Switchyard server listening on {}", addr);
    info!("Event stream endpoint: ws://{}/routes/{{route_id}}/events", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("Server stopped");
    Ok(())
}

/// Periodically drop subscriptions whose consumers vanished and refresh the
/// router metrics.
async fn prune_loop(state: Arc<AppState>) {
    let mut ticker = tokio::time::interval(state.config.prune_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let pruned = state.router.prune();
        if pruned > 0 {
            debug!(pruned, "Swept abandoned subscriptions");
        }
        metrics::record_router_stats(&state.router.stats());
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

/// Health check handler.
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Router statistics handler.
async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stats = state.router.stats();
    Json(json!({
        "routes": stats.route_count,
        "subscriptions": stats.subscription_count,
        "published": stats.published,
        "delivered": stats.delivered,
        "dropped": stats.dropped,
        "pruned": stats.pruned,
    }))
}

/// Publish the request body to a route.
async fn publish_handler(
    Path(route_id): Path<RouteId>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    let delivered = state.router.publish(route_id, payload);
    debug!(route = route_id, delivered, "Published via HTTP");
    Json(json!({ "route": route_id, "delivered": delivered }))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(route_id): Path<RouteId>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, route_id, state))
}

/// Stream a route's events to one websocket client.
async fn handle_websocket(socket: WebSocket, route_id: RouteId, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    debug!(route = route_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    let mut streamer = RouteStreamer::new(Arc::clone(&state.router), route_id);

    // Inbound frames are ignored; the read side only tells us when the
    // client has gone.
    let closed = async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    debug!(route = route_id, "Received close frame");
                    break;
                }
                Err(e) => {
                    warn!(route = route_id, error = %e, "WebSocket error");
                    break;
                }
                Ok(_) => {}
            }
        }
    };

    match relay(
        &mut streamer,
        &mut sender,
        &state.config.relay_config(),
        closed,
    )
    .await
    {
        Ok(report) => {
            metrics::record_relay(&report);
            debug!(
                route = route_id,
                exit = ?report.exit,
                payloads = report.payloads,
                keepalives = report.keepalives,
                "WebSocket disconnected"
            );
        }
        Err(e) => {
            metrics::record_error("relay");
            warn!(route = route_id, error = %e, "Relay failed");
        }
    }

    let _ = sender.close().await;
    metrics::record_router_stats(&state.router.stats());
}
