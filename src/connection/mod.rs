mod backoff;

pub use backoff::{Backoff, BackoffConfig};

use crate::metrics::ShipperMetrics;
use crate::resolver::EndpointResolver;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Connect aborted by shutdown")]
    Cancelled,
}

/// Connection lifecycle as reported to metrics. Exactly one live connection
/// exists per shipper; only the sender side mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Failed = 3,
}

impl ConnectionState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Failed,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Owns the single outbound TCP connection and its reconnect policy.
///
/// Candidates are tried in resolver order, first success wins; when the whole
/// set is exhausted the manager sleeps one backoff round and sweeps again,
/// until it connects or is cancelled. An established connection is reused for
/// every send until a failure is observed.
pub struct ConnectionManager {
    resolver: Arc<EndpointResolver>,
    metrics: Arc<ShipperMetrics>,
    config: ConnectionConfig,
    backoff: Backoff,
    conn: Option<TcpStream>,
    peer: Option<String>,
    ever_connected: bool,
}

impl ConnectionManager {
    pub fn new(
        resolver: Arc<EndpointResolver>,
        metrics: Arc<ShipperMetrics>,
        config: ConnectionConfig,
        backoff: BackoffConfig,
    ) -> Self {
        Self {
            resolver,
            metrics,
            config,
            backoff: Backoff::new(backoff),
            conn: None,
            peer: None,
            ever_connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Address of the current peer, if connected.
    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    /// Returns the live connection, establishing one first if needed.
    ///
    /// Blocks (within the background worker only) until a candidate accepts
    /// or the token is cancelled.
    pub async fn acquire(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<&mut TcpStream, ConnectionError> {
        // A re-resolution that dropped the current peer retires the
        // connection even though it has seen no failure.
        let peer_retired = match (&self.conn, &self.peer) {
            (Some(_), Some(peer)) => {
                let current = self.resolver.endpoints();
                !current.is_empty() && !current.iter().any(|e| e.addr() == *peer)
            }
            _ => false,
        };
        if peer_retired {
            debug!(peer = ?self.peer, "peer no longer in resolved endpoint set, reconnecting");
            self.conn = None;
            self.peer = None;
        }

        if self.conn.is_none() {
            let (stream, peer) = self.establish(cancel).await?;
            self.conn = Some(stream);
            self.peer = Some(peer);
        }

        match self.conn.as_mut() {
            Some(stream) => Ok(stream),
            None => Err(ConnectionError::Cancelled),
        }
    }

    async fn establish(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<(TcpStream, String), ConnectionError> {
        self.metrics.set_connection_state(ConnectionState::Connecting);

        loop {
            let endpoints = self.resolver.endpoints();
            if endpoints.is_empty() {
                debug!("no resolved endpoints yet");
            }

            for endpoint in &*endpoints {
                if cancel.is_cancelled() {
                    self.metrics.set_connection_state(ConnectionState::Disconnected);
                    return Err(ConnectionError::Cancelled);
                }

                let addr = endpoint.addr();
                self.metrics.record_connect_attempt();

                let attempt = timeout(self.config.connect_timeout, TcpStream::connect(&addr));
                let result = tokio::select! {
                    _ = cancel.cancelled() => {
                        self.metrics.set_connection_state(ConnectionState::Disconnected);
                        return Err(ConnectionError::Cancelled);
                    }
                    result = attempt => result,
                };

                match result {
                    Ok(Ok(stream)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(peer = %addr, error = %e, "set_nodelay failed");
                        }
                        if self.ever_connected {
                            self.metrics.record_reconnect();
                        }
                        self.ever_connected = true;
                        self.backoff.reset();
                        self.metrics.set_connection_state(ConnectionState::Connected);
                        info!(peer = %addr, priority = endpoint.priority, "connected to collector");
                        return Ok((stream, addr));
                    }
                    Ok(Err(e)) => {
                        self.metrics.record_connect_failure();
                        debug!(peer = %addr, error = %e, "connect failed");
                    }
                    Err(_) => {
                        self.metrics.record_connect_failure();
                        debug!(peer = %addr, timeout = ?self.config.connect_timeout, "connect timed out");
                    }
                }
            }

            // Whole candidate set exhausted: back off, then sweep again.
            self.metrics.set_connection_state(ConnectionState::Failed);
            let delay = self.backoff.next_delay();
            warn!(
                candidates = self.resolver.endpoints().len(),
                retry_in = ?delay,
                "all endpoints failed, backing off"
            );
            self.metrics.set_connection_state(ConnectionState::Disconnected);

            tokio::select! {
                _ = cancel.cancelled() => return Err(ConnectionError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            self.metrics.set_connection_state(ConnectionState::Connecting);
        }
    }

    /// Tears down the connection after an observed failure. The next
    /// `acquire` reconnects.
    pub fn mark_failed(&mut self) {
        if let Some(peer) = self.peer.take() {
            warn!(peer = %peer, "connection marked failed");
        }
        self.conn = None;
        self.metrics.set_connection_state(ConnectionState::Failed);
    }

    /// Graceful teardown on shutdown.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.conn.take() {
            let _ = stream.shutdown().await;
        }
        self.peer = None;
        self.metrics.set_connection_state(ConnectionState::Disconnected);
    }
}
