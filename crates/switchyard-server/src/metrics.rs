//! Metrics collection and export for Switchyard.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use switchyard_core::RouterStats;
use switchyard_relay::RelayReport;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "switchyard_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "switchyard_connections_active";
    pub const PUBLISHED_TOTAL: &str = "switchyard_published_total";
    pub const DELIVERED_TOTAL: &str = "switchyard_delivered_total";
    pub const DROPPED_TOTAL: &str = "switchyard_dropped_total";
    pub const PRUNED_TOTAL: &str = "switchyard_pruned_total";
    pub const ROUTES_ACTIVE: &str = "switchyard_routes_active";
    pub const SUBSCRIPTIONS_ACTIVE: &str = "switchyard_subscriptions_active";
    pub const RELAYED_TOTAL: &str = "switchyard_relayed_total";
    pub const KEEPALIVES_TOTAL: &str = "switchyard_keepalives_total";
    pub const ERRORS_TOTAL: &str = "switchyard_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of relay connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of relay connections"
    );
    metrics::describe_counter!(names::PUBLISHED_TOTAL, "Total number of publish calls");
    metrics::describe_counter!(
        names::DELIVERED_TOTAL,
        "Payloads accepted by a subscription buffer"
    );
    metrics::describe_counter!(
        names::DROPPED_TOTAL,
        "Payloads dropped because a subscription buffer was full"
    );
    metrics::describe_counter!(
        names::PRUNED_TOTAL,
        "Subscriptions removed after their consumer went away"
    );
    metrics::describe_gauge!(names::ROUTES_ACTIVE, "Routes with at least one subscriber");
    metrics::describe_gauge!(names::SUBSCRIPTIONS_ACTIVE, "Live subscriptions");
    metrics::describe_counter!(names::RELAYED_TOTAL, "Payload frames written to clients");
    metrics::describe_counter!(names::KEEPALIVES_TOTAL, "Keepalive frames written to clients");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record the frames written by a finished relay.
pub fn record_relay(report: &RelayReport) {
    counter!(names::RELAYED_TOTAL).increment(report.payloads);
    counter!(names::KEEPALIVES_TOTAL).increment(report.keepalives);
}

/// Mirror the router's counters and gauges.
pub fn record_router_stats(stats: &RouterStats) {
    counter!(names::PUBLISHED_TOTAL).absolute(stats.published);
    counter!(names::DELIVERED_TOTAL).absolute(stats.delivered);
    counter!(names::DROPPED_TOTAL).absolute(stats.dropped);
    counter!(names::PRUNED_TOTAL).absolute(stats.pruned);
    gauge!(names::ROUTES_ACTIVE).set(stats.route_count as f64);
    gauge!(names::SUBSCRIPTIONS_ACTIVE).set(stats.subscription_count as f64);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
