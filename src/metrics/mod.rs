mod exporter;

pub use exporter::MetricsExporter;

use crate::connection::ConnectionState;
use std::sync::atomic::{AtomicI64, AtomicU8, AtomicU64, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[cfg(feature = "metrics")]
    #[error("Prometheus error: {0}")]
    PrometheusError(#[from] prometheus::Error),
    #[error("HTTP server error: {0}")]
    HttpError(String),
}

/// Why an event was lost. Every drop is counted under exactly one reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Queue at capacity under the reject policy; the new event was refused.
    QueueFull,
    /// Queue at capacity under the evict policy; the oldest event was discarded.
    Evicted,
    /// Event could not be encoded; never retried.
    Serialization,
    /// Write failed and the single retry was already spent.
    SendFailed,
    /// Still queued when the shutdown grace period expired.
    Shutdown,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::QueueFull => "queue_full",
            DropReason::Evicted => "evicted",
            DropReason::Serialization => "serialization",
            DropReason::SendFailed => "send_failed",
            DropReason::Shutdown => "shutdown",
        }
    }
}

/// Read-only view of delivery health at one instant.
///
/// Counters are monotonic for the process lifetime; gauges are instantaneous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_submitted: u64,
    pub events_sent: u64,
    pub bytes_sent: u64,
    pub dropped_queue_full: u64,
    pub dropped_evicted: u64,
    pub dropped_serialization: u64,
    pub dropped_send_failed: u64,
    pub dropped_shutdown: u64,
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub reconnects: u64,
    pub resolutions_ok: u64,
    pub resolutions_failed: u64,
    pub queue_depth: i64,
    pub connection_state: ConnectionState,
}

impl MetricsSnapshot {
    pub fn dropped_total(&self) -> u64 {
        self.dropped_queue_full
            + self.dropped_evicted
            + self.dropped_serialization
            + self.dropped_send_failed
            + self.dropped_shutdown
    }
}

/// Lock-free delivery metrics. Updates are fire-and-forget from the hot path;
/// nothing here ever blocks a producer or the sender loop.
#[derive(Debug)]
pub struct ShipperMetrics {
    events_submitted: AtomicU64,
    events_sent: AtomicU64,
    bytes_sent: AtomicU64,
    dropped_queue_full: AtomicU64,
    dropped_evicted: AtomicU64,
    dropped_serialization: AtomicU64,
    dropped_send_failed: AtomicU64,
    dropped_shutdown: AtomicU64,
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    reconnects: AtomicU64,
    resolutions_ok: AtomicU64,
    resolutions_failed: AtomicU64,
    queue_depth: AtomicI64,
    connection_state: AtomicU8,
}

impl ShipperMetrics {
    pub fn new() -> Self {
        Self {
            events_submitted: AtomicU64::new(0),
            events_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            dropped_queue_full: AtomicU64::new(0),
            dropped_evicted: AtomicU64::new(0),
            dropped_serialization: AtomicU64::new(0),
            dropped_send_failed: AtomicU64::new(0),
            dropped_shutdown: AtomicU64::new(0),
            connect_attempts: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            resolutions_ok: AtomicU64::new(0),
            resolutions_failed: AtomicU64::new(0),
            queue_depth: AtomicI64::new(0),
            connection_state: AtomicU8::new(ConnectionState::Disconnected as u8),
        }
    }

    pub fn record_submitted(&self) {
        self.events_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self, bytes: usize) {
        self.events_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, reason: DropReason) {
        let counter = match reason {
            DropReason::QueueFull => &self.dropped_queue_full,
            DropReason::Evicted => &self.dropped_evicted,
            DropReason::Serialization => &self.dropped_serialization,
            DropReason::SendFailed => &self.dropped_send_failed,
            DropReason::Shutdown => &self.dropped_shutdown,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resolution(&self, success: bool) {
        if success {
            self.resolutions_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.resolutions_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth as i64, Ordering::Relaxed);
    }

    pub fn set_connection_state(&self, state: ConnectionState) {
        self.connection_state.store(state as u8, Ordering::Relaxed);
    }

    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.connection_state.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_submitted: self.events_submitted.load(Ordering::Relaxed),
            events_sent: self.events_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            dropped_queue_full: self.dropped_queue_full.load(Ordering::Relaxed),
            dropped_evicted: self.dropped_evicted.load(Ordering::Relaxed),
            dropped_serialization: self.dropped_serialization.load(Ordering::Relaxed),
            dropped_send_failed: self.dropped_send_failed.load(Ordering::Relaxed),
            dropped_shutdown: self.dropped_shutdown.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            resolutions_ok: self.resolutions_ok.load(Ordering::Relaxed),
            resolutions_failed: self.resolutions_failed.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            connection_state: self.connection_state(),
        }
    }
}

impl Default for ShipperMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_by_reason() {
        let metrics = ShipperMetrics::new();
        metrics.record_submitted();
        metrics.record_submitted();
        metrics.record_sent(42);
        metrics.record_dropped(DropReason::QueueFull);
        metrics.record_dropped(DropReason::Evicted);
        metrics.record_dropped(DropReason::Evicted);

        let snap = metrics.snapshot();
        assert_eq!(snap.events_submitted, 2);
        assert_eq!(snap.events_sent, 1);
        assert_eq!(snap.bytes_sent, 42);
        assert_eq!(snap.dropped_queue_full, 1);
        assert_eq!(snap.dropped_evicted, 2);
        assert_eq!(snap.dropped_total(), 3);
    }

    #[test]
    fn connection_state_gauge_round_trips() {
        let metrics = ShipperMetrics::new();
        assert_eq!(metrics.snapshot().connection_state, ConnectionState::Disconnected);
        metrics.set_connection_state(ConnectionState::Connected);
        assert_eq!(metrics.snapshot().connection_state, ConnectionState::Connected);
    }
}
