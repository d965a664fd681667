use crate::connection::{ConnectionError, ConnectionManager};
use crate::event::Event;
use crate::metrics::{DropReason, ShipperMetrics};
use crate::queue::EventQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct SenderConfig {
    /// Upper bound on the shutdown drain. Events still queued when it expires
    /// are dropped and counted.
    pub shutdown_grace: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            shutdown_grace: Duration::from_secs(4),
        }
    }
}

/// The single background worker that moves events from the queue to the wire.
///
/// Dequeues one event at a time, encodes it as an NDJSON line, and writes it
/// to the live connection. A write failure tears the connection down and the
/// event is retried exactly once after reconnect; encoding failures are
/// dropped immediately (a format defect cannot be fixed by retrying). The
/// worker never panics the process and only ever blocks inside itself.
pub struct SenderLoop {
    queue: Arc<EventQueue>,
    connection: ConnectionManager,
    metrics: Arc<ShipperMetrics>,
    config: SenderConfig,
    cancel: CancellationToken,
}

impl SenderLoop {
    pub fn new(
        queue: Arc<EventQueue>,
        connection: ConnectionManager,
        metrics: Arc<ShipperMetrics>,
        config: SenderConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue,
            connection,
            metrics,
            config,
            cancel,
        }
    }

    pub async fn run(mut self) {
        debug!("sender loop started");

        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = self.queue.pop() => event,
            };

            let cancel = self.cancel.clone();
            self.deliver(event, &cancel).await;
        }

        self.drain().await;
        self.connection.close().await;
        debug!("sender loop stopped");
    }

    /// Sends one event: encode, write, at-most-one retry on write failure.
    async fn deliver(&mut self, event: Event, cancel: &CancellationToken) {
        let line = match event.encode_line() {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "event not encodable, dropping");
                self.metrics.record_dropped(DropReason::Serialization);
                return;
            }
        };

        for attempt in 0..2 {
            let stream = match self.connection.acquire(cancel).await {
                Ok(stream) => stream,
                Err(ConnectionError::Cancelled) => {
                    self.metrics.record_dropped(DropReason::Shutdown);
                    return;
                }
            };

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    // A partially written line would corrupt the stream.
                    self.connection.mark_failed();
                    self.metrics.record_dropped(DropReason::Shutdown);
                    return;
                }
                result = write_line(stream, &line) => result,
            };

            match result {
                Ok(()) => {
                    self.metrics.record_sent(line.len());
                    return;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "write failed");
                    self.connection.mark_failed();
                }
            }
        }

        self.metrics.record_dropped(DropReason::SendFailed);
    }

    /// Best-effort delivery of whatever is still queued, bounded by the
    /// configured grace period. Events abandoned at the deadline are counted,
    /// never silently lost.
    async fn drain(&mut self) {
        let pending = self.queue.len();
        if pending > 0 {
            info!(pending, grace = ?self.config.shutdown_grace, "draining queue before shutdown");
        }

        // Fresh token: the shutdown signal must not abort the drain itself,
        // only the deadline may.
        let drain_cancel = CancellationToken::new();
        let deadline = {
            let drain_cancel = drain_cancel.clone();
            let grace = self.config.shutdown_grace;
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                drain_cancel.cancel();
            })
        };

        let mut abandoned = 0u64;
        while let Some(event) = self.queue.try_pop() {
            if drain_cancel.is_cancelled() {
                self.metrics.record_dropped(DropReason::Shutdown);
                abandoned += 1;
                continue;
            }
            self.deliver(event, &drain_cancel).await;
        }
        deadline.abort();

        if abandoned > 0 {
            warn!(abandoned, "shutdown grace expired with events still queued");
        }
    }
}

async fn write_line(
    stream: &mut tokio::net::TcpStream,
    line: &[u8],
) -> Result<(), std::io::Error> {
    stream.write_all(line).await?;
    stream.flush().await
}
