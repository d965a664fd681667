use super::MetricsError;
use crate::metrics::ShipperMetrics;
use std::sync::Arc;

#[cfg(feature = "metrics")]
use prometheus::{Encoder, IntGauge, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use warp::Filter;

/// Pull-based metrics export: renders the current [`MetricsSnapshot`] in
/// Prometheus text format on each scrape. Counters stay authoritative in the
/// atomics; the registry is refreshed at export time so the hot path never
/// touches prometheus types.
///
/// [`MetricsSnapshot`]: crate::metrics::MetricsSnapshot
#[derive(Clone)]
pub struct MetricsExporter {
    metrics: Arc<ShipperMetrics>,
    #[cfg(feature = "metrics")]
    registry: Arc<Registry>,
    #[cfg(feature = "metrics")]
    gauges: Arc<Gauges>,
}

#[cfg(feature = "metrics")]
struct Gauges {
    events_submitted: IntGauge,
    events_sent: IntGauge,
    bytes_sent: IntGauge,
    events_dropped: prometheus::IntGaugeVec,
    connect_attempts: IntGauge,
    connect_failures: IntGauge,
    reconnects: IntGauge,
    resolutions_ok: IntGauge,
    resolutions_failed: IntGauge,
    queue_depth: IntGauge,
    connection_state: IntGauge,
}

#[cfg(feature = "metrics")]
fn register_gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, MetricsError> {
    let gauge = IntGauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

impl MetricsExporter {
    #[cfg(feature = "metrics")]
    pub fn new(metrics: Arc<ShipperMetrics>) -> Result<Self, MetricsError> {
        let registry = Arc::new(Registry::new());

        let events_dropped = prometheus::IntGaugeVec::new(
            prometheus::Opts::new("logship_events_dropped_total", "Events dropped, by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(events_dropped.clone()))?;

        let gauges = Gauges {
            events_submitted: register_gauge(
                &registry,
                "logship_events_submitted_total",
                "Events accepted into the queue",
            )?,
            events_sent: register_gauge(
                &registry,
                "logship_events_sent_total",
                "Events written to the collector",
            )?,
            bytes_sent: register_gauge(
                &registry,
                "logship_bytes_sent_total",
                "Wire bytes written to the collector",
            )?,
            events_dropped,
            connect_attempts: register_gauge(
                &registry,
                "logship_connect_attempts_total",
                "TCP connect attempts",
            )?,
            connect_failures: register_gauge(
                &registry,
                "logship_connect_failures_total",
                "TCP connect failures",
            )?,
            reconnects: register_gauge(
                &registry,
                "logship_reconnects_total",
                "Connections torn down and re-established",
            )?,
            resolutions_ok: register_gauge(
                &registry,
                "logship_resolutions_total",
                "Successful endpoint resolutions",
            )?,
            resolutions_failed: register_gauge(
                &registry,
                "logship_resolution_failures_total",
                "Failed endpoint resolutions",
            )?,
            queue_depth: register_gauge(
                &registry,
                "logship_queue_depth",
                "Events currently queued",
            )?,
            connection_state: register_gauge(
                &registry,
                "logship_connection_state",
                "0=disconnected 1=connecting 2=connected 3=failed",
            )?,
        };

        Ok(Self {
            metrics,
            registry,
            gauges: Arc::new(gauges),
        })
    }

    #[cfg(not(feature = "metrics"))]
    pub fn new(metrics: Arc<ShipperMetrics>) -> Result<Self, MetricsError> {
        Ok(Self { metrics })
    }

    #[cfg(feature = "metrics")]
    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        let snap = self.metrics.snapshot();
        let g = &self.gauges;

        g.events_submitted.set(snap.events_submitted as i64);
        g.events_sent.set(snap.events_sent as i64);
        g.bytes_sent.set(snap.bytes_sent as i64);
        g.events_dropped
            .with_label_values(&["queue_full"])
            .set(snap.dropped_queue_full as i64);
        g.events_dropped
            .with_label_values(&["evicted"])
            .set(snap.dropped_evicted as i64);
        g.events_dropped
            .with_label_values(&["serialization"])
            .set(snap.dropped_serialization as i64);
        g.events_dropped
            .with_label_values(&["send_failed"])
            .set(snap.dropped_send_failed as i64);
        g.events_dropped
            .with_label_values(&["shutdown"])
            .set(snap.dropped_shutdown as i64);
        g.connect_attempts.set(snap.connect_attempts as i64);
        g.connect_failures.set(snap.connect_failures as i64);
        g.reconnects.set(snap.reconnects as i64);
        g.resolutions_ok.set(snap.resolutions_ok as i64);
        g.resolutions_failed.set(snap.resolutions_failed as i64);
        g.queue_depth.set(snap.queue_depth);
        g.connection_state.set(snap.connection_state as u8 as i64);

        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8_lossy(&buffer).to_string())
    }

    #[cfg(not(feature = "metrics"))]
    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        let _ = &self.metrics;
        Ok("# Metrics disabled\n".to_string())
    }

    #[cfg(feature = "metrics")]
    pub async fn start_server(&self, port: u16) -> Result<(), MetricsError> {
        let exporter = self.clone();

        let metrics = warp::path!("metrics").and(warp::get()).map(move || {
            use warp::Reply;
            match exporter.export_metrics() {
                Ok(text) => {
                    warp::reply::with_header(text, "content-type", "text/plain; version=0.0.4")
                        .into_response()
                }
                Err(_) => warp::reply::with_status(
                    "Internal Server Error",
                    warp::http::StatusCode::INTERNAL_SERVER_ERROR,
                )
                .into_response(),
            }
        });

        let health = warp::path!("health").and(warp::get()).map(|| "OK");

        let routes = metrics.or(health);

        tracing::info!("Starting Prometheus metrics server on port {port}");
        warp::serve(routes).run(([0, 0, 0, 0], port)).await;

        Ok(())
    }

    #[cfg(not(feature = "metrics"))]
    pub async fn start_server(&self, _port: u16) -> Result<(), MetricsError> {
        tracing::warn!("Metrics feature is disabled");
        Ok(())
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;
    use crate::metrics::DropReason;

    #[test]
    fn export_renders_counters() {
        let metrics = Arc::new(ShipperMetrics::new());
        metrics.record_submitted();
        metrics.record_sent(10);
        metrics.record_dropped(DropReason::SendFailed);

        let exporter = MetricsExporter::new(metrics).unwrap();
        let text = exporter.export_metrics().unwrap();

        assert!(text.contains("logship_events_submitted_total 1"));
        assert!(text.contains("logship_events_sent_total 1"));
        assert!(text.contains("reason=\"send_failed\""));
    }
}
