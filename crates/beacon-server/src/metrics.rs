//! Metrics collection and export for Beacon.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use std::net::{Ipv4Addr, SocketAddr};

use anyhow::{Context, Result};
use beacon_core::{SweepReport, TickReport};
use beacon_protocol::StatusCode;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// Metric names.
pub mod names {
    pub const EVENTS_INGESTED: &str = "beacon_events_ingested_total";
    pub const INGEST_REJECTED: &str = "beacon_ingest_rejected_total";
    pub const EVENTS_BROADCAST: &str = "beacon_events_broadcast_total";
    pub const DELIVERIES: &str = "beacon_deliveries_total";
    pub const EVENTS_DROPPED: &str = "beacon_events_dropped_total";
    pub const SUBSCRIBERS_ACTIVE: &str = "beacon_subscribers_active";
    pub const SUBSCRIBERS_TOTAL: &str = "beacon_subscribers_total";
    pub const PROBES: &str = "beacon_probes_total";
    pub const EVICTIONS: &str = "beacon_evictions_total";
    pub const QUEUE_DEPTH: &str = "beacon_queue_depth";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    // Describe metrics
    metrics::describe_counter!(names::EVENTS_INGESTED, "Events accepted by the ingestion endpoint");
    metrics::describe_counter!(
        names::INGEST_REJECTED,
        "Ingestion requests answered with an error, by status"
    );
    metrics::describe_counter!(names::EVENTS_BROADCAST, "Events drained by the broadcast tick");
    metrics::describe_counter!(names::DELIVERIES, "Events handed to subscriber outboxes");
    metrics::describe_counter!(
        names::EVENTS_DROPPED,
        "Events drained while no subscriber was connected"
    );
    metrics::describe_gauge!(names::SUBSCRIBERS_ACTIVE, "Current number of open subscribers");
    metrics::describe_counter!(
        names::SUBSCRIBERS_TOTAL,
        "Total number of subscribers since server start"
    );
    metrics::describe_counter!(names::PROBES, "Liveness probes sent");
    metrics::describe_counter!(names::EVICTIONS, "Subscribers evicted, by reason");
    metrics::describe_gauge!(names::QUEUE_DEPTH, "Events waiting for the next tick");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record an accepted event and the resulting queue depth.
pub fn record_ingested(depth: usize) {
    counter!(names::EVENTS_INGESTED).increment(1);
    gauge!(names::QUEUE_DEPTH).set(depth as f64);
}

/// Record an ingestion request answered with an error.
pub fn record_rejected(status: StatusCode) {
    counter!(names::INGEST_REJECTED, "status" => status.as_u16().to_string()).increment(1);
}

/// Record the outcome of one broadcast tick.
pub fn record_tick(report: &TickReport) {
    gauge!(names::QUEUE_DEPTH).set(0.0);
    if report.events == 0 {
        return;
    }
    counter!(names::EVENTS_BROADCAST).increment(report.events as u64);
    counter!(names::DELIVERIES).increment(report.deliveries as u64);
    counter!(names::EVENTS_DROPPED).increment(report.dropped as u64);
    counter!(names::EVICTIONS, "reason" => "send_failed").increment(report.evicted as u64);
}

/// Record the outcome of one liveness sweep.
pub fn record_sweep(report: &SweepReport) {
    counter!(names::PROBES).increment(report.probed as u64);
    counter!(names::EVICTIONS, "reason" => "timeout").increment(report.expired as u64);
    counter!(names::EVICTIONS, "reason" => "probe_failed").increment(report.failed as u64);
}

/// Metrics guard tracking one open subscriber session.
pub struct SubscriberMetricsGuard;

impl SubscriberMetricsGuard {
    /// Create a new metrics guard, recording a subscriber.
    #[must_use]
    pub fn new() -> Self {
        counter!(names::SUBSCRIBERS_TOTAL).increment(1);
        gauge!(names::SUBSCRIBERS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for SubscriberMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SubscriberMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::SUBSCRIBERS_ACTIVE).decrement(1.0);
    }
}
