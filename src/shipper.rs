use crate::connection::{BackoffConfig, ConnectionConfig, ConnectionManager};
use crate::event::Event;
use crate::metrics::{MetricsSnapshot, ShipperMetrics};
use crate::queue::{EventQueue, OverflowPolicy, QueueError, SubmitOutcome};
use crate::resolver::{EndpointResolver, ResolveError, ServerSpec};
use crate::sender::{SenderConfig, SenderLoop};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum StartError {
    #[error("Resolver error: {0}")]
    Resolve(#[from] ResolveError),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Everything the delivery engine needs, finalized before start. The running
/// shipper exposes no mutators; reconfiguration means building a new one.
#[derive(Debug, Clone)]
pub struct ShipperConfig {
    /// `host:port` literal, or a bare name resolved via DNS SRV.
    pub server_spec: String,
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub backoff: BackoffConfig,
    pub resolution_interval: Duration,
    pub connect_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            server_spec: "localhost:5044".to_string(),
            queue_capacity: 10_000,
            overflow_policy: OverflowPolicy::default(),
            backoff: BackoffConfig::default(),
            resolution_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(4),
        }
    }
}

struct ShipperInner {
    queue: Arc<EventQueue>,
    metrics: Arc<ShipperMetrics>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Handle to a running delivery engine.
///
/// Cheap to clone; every clone shares the same queue and workers. `submit`
/// is the producer contract: it never errors, never panics, and never blocks
/// the caller beyond the queue's internal lock — a logging call site must not
/// be able to fail because the collector is down.
#[derive(Clone)]
pub struct Shipper {
    inner: Arc<ShipperInner>,
}

impl Shipper {
    /// Validates the configuration, wires queue + resolver + connection +
    /// sender, and spawns the background workers.
    ///
    /// A syntactically invalid server spec is fatal; a failed first SRV
    /// lookup is not — the refresh task keeps retrying on its interval.
    pub async fn start(config: ShipperConfig) -> Result<Self, StartError> {
        if config.resolution_interval.is_zero() {
            return Err(StartError::InvalidConfig(
                "resolution_interval must be positive".to_string(),
            ));
        }

        let metrics = Arc::new(ShipperMetrics::new());
        let spec = ServerSpec::parse(&config.server_spec)?;
        let resolver = Arc::new(EndpointResolver::new(spec, metrics.clone())?);

        if let Err(e) = resolver.refresh().await {
            warn!(error = %e, "initial resolution failed, will retry on schedule");
        }

        let queue = Arc::new(EventQueue::new(
            config.queue_capacity,
            config.overflow_policy,
            metrics.clone(),
        )?);

        let cancel = CancellationToken::new();
        let refresh_task =
            resolver.spawn_refresh_task(config.resolution_interval, cancel.clone());

        let connection = ConnectionManager::new(
            resolver.clone(),
            metrics.clone(),
            ConnectionConfig {
                connect_timeout: config.connect_timeout,
            },
            config.backoff.clone(),
        );

        let sender = SenderLoop::new(
            queue.clone(),
            connection,
            metrics.clone(),
            SenderConfig {
                shutdown_grace: config.shutdown_grace,
            },
            cancel.clone(),
        );
        let sender_task = tokio::spawn(sender.run());

        info!(
            server = %config.server_spec,
            capacity = config.queue_capacity,
            policy = ?config.overflow_policy,
            "shipper started"
        );

        Ok(Self {
            inner: Arc::new(ShipperInner {
                queue,
                metrics,
                cancel,
                tasks: Mutex::new(vec![refresh_task, sender_task]),
            }),
        })
    }

    /// Submits one event for delivery. Best-effort: the outcome says whether
    /// the queue accepted it, and any loss is visible in the metrics.
    pub fn submit(&self, event: Event) -> SubmitOutcome {
        self.inner.queue.submit(event)
    }

    pub fn queue_depth(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Shared metrics handle, e.g. for the Prometheus exporter.
    pub fn metrics_handle(&self) -> Arc<ShipperMetrics> {
        self.inner.metrics.clone()
    }

    /// Signals the workers to stop, waits for the sender's bounded drain, and
    /// closes the connection. Idempotent; later calls return immediately.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let tasks: Vec<JoinHandle<()>> = self.inner.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "worker task panicked during shutdown");
            }
        }
        info!("shipper stopped");
    }
}
