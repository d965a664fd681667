mod spec;

pub use spec::{Endpoint, ServerSpec, order_srv_targets};

use crate::metrics::ShipperMetrics;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use trust_dns_resolver::TokioAsyncResolver;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Invalid server spec: {0}")]
    InvalidSpec(String),
    #[error("DNS lookup failed: {0}")]
    Lookup(#[from] trust_dns_resolver::error::ResolveError),
    #[error("SRV lookup for '{0}' returned no records")]
    NoRecords(String),
}

/// Resolves the configured server spec into an ordered endpoint set and keeps
/// it fresh on a background timer, separate from the send path.
///
/// The endpoint set is swapped atomically as a whole `Arc`; a failed lookup
/// retains the previous set (stale-but-usable) and only bumps a counter.
pub struct EndpointResolver {
    spec: ServerSpec,
    dns: Option<TokioAsyncResolver>,
    endpoints: RwLock<Arc<Vec<Endpoint>>>,
    metrics: Arc<ShipperMetrics>,
}

impl EndpointResolver {
    pub fn new(spec: ServerSpec, metrics: Arc<ShipperMetrics>) -> Result<Self, ResolveError> {
        let dns = match &spec {
            ServerSpec::Srv { .. } => Some(TokioAsyncResolver::tokio_from_system_conf()?),
            ServerSpec::Literal { .. } => None,
        };

        Ok(Self {
            spec,
            dns,
            endpoints: RwLock::new(Arc::new(Vec::new())),
            metrics,
        })
    }

    pub fn spec(&self) -> &ServerSpec {
        &self.spec
    }

    /// Current endpoint snapshot, highest priority first. Never torn: readers
    /// hold a complete, immutable set.
    pub fn endpoints(&self) -> Arc<Vec<Endpoint>> {
        self.endpoints.read().clone()
    }

    /// Re-resolves the spec and swaps in the new set. On lookup failure the
    /// previous set stays in service.
    pub async fn refresh(&self) -> Result<(), ResolveError> {
        let result = self.resolve().await;
        self.apply(result)
    }

    pub(crate) fn apply(&self, result: Result<Vec<Endpoint>, ResolveError>) -> Result<(), ResolveError> {
        match result {
            Ok(resolved) => {
                self.metrics.record_resolution(true);
                debug!(
                    spec = %self.spec,
                    endpoints = resolved.len(),
                    "endpoint set refreshed"
                );
                *self.endpoints.write() = Arc::new(resolved);
                Ok(())
            }
            Err(e) => {
                self.metrics.record_resolution(false);
                warn!(spec = %self.spec, error = %e, "resolution failed, keeping previous endpoint set");
                Err(e)
            }
        }
    }

    async fn resolve(&self) -> Result<Vec<Endpoint>, ResolveError> {
        match &self.spec {
            ServerSpec::Literal { host, port } => Ok(vec![Endpoint::literal(host, *port)]),
            ServerSpec::Srv { name } => {
                let dns = self
                    .dns
                    .as_ref()
                    .ok_or_else(|| ResolveError::InvalidSpec("SRV resolver missing".to_string()))?;
                let lookup = dns.srv_lookup(name.as_str()).await?;
                let resolved_at = Instant::now();

                let targets: Vec<Endpoint> = lookup
                    .iter()
                    .map(|srv| Endpoint {
                        host: srv.target().to_utf8().trim_end_matches('.').to_string(),
                        port: srv.port(),
                        priority: srv.priority(),
                        weight: srv.weight(),
                        resolved_at,
                    })
                    .collect();

                if targets.is_empty() {
                    return Err(ResolveError::NoRecords(name.clone()));
                }

                Ok(order_srv_targets(targets, &mut rand::rng()))
            }
        }
    }

    /// Spawns the periodic re-resolution task. Runs until cancelled; failures
    /// are counted and retried on the next tick.
    pub fn spawn_refresh_task(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let resolver = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; the initial resolution already ran.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("resolver refresh task stopping");
                        return;
                    }
                    _ = ticker.tick() => {
                        let _ = resolver.refresh().await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(spec: &str) -> Arc<EndpointResolver> {
        let metrics = Arc::new(ShipperMetrics::new());
        Arc::new(EndpointResolver::new(ServerSpec::parse(spec).unwrap(), metrics).unwrap())
    }

    #[tokio::test]
    async fn literal_spec_resolves_to_single_endpoint() {
        let resolver = resolver("collector.internal:5044");
        resolver.refresh().await.unwrap();

        let endpoints = resolver.endpoints();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].host, "collector.internal");
        assert_eq!(endpoints[0].port, 5044);
        assert_eq!(endpoints[0].priority, 0);
    }

    #[tokio::test]
    async fn snapshot_is_empty_before_first_refresh() {
        let resolver = resolver("collector.internal:5044");
        assert!(resolver.endpoints().is_empty());
    }

    #[tokio::test]
    async fn failed_resolution_retains_previous_set() {
        let metrics = Arc::new(ShipperMetrics::new());
        let resolver = EndpointResolver::new(
            ServerSpec::parse("collector:5044").unwrap(),
            metrics.clone(),
        )
        .unwrap();
        resolver.refresh().await.unwrap();
        let before = resolver.endpoints();

        let failed = resolver.apply(Err(ResolveError::NoRecords("collector".to_string())));
        assert!(failed.is_err());

        let after = resolver.endpoints();
        assert_eq!(*before, *after);
        assert_eq!(metrics.snapshot().resolutions_failed, 1);

        // A later success swaps the whole set in one step.
        resolver
            .apply(Ok(vec![Endpoint::literal("replacement", 5045)]))
            .unwrap();
        assert_eq!(resolver.endpoints()[0].host, "replacement");
    }

    #[tokio::test]
    async fn refresh_counts_successes() {
        let metrics = Arc::new(ShipperMetrics::new());
        let resolver = EndpointResolver::new(
            ServerSpec::parse("collector:5044").unwrap(),
            metrics.clone(),
        )
        .unwrap();

        resolver.refresh().await.unwrap();
        resolver.refresh().await.unwrap();
        assert_eq!(metrics.snapshot().resolutions_ok, 2);
        assert_eq!(metrics.snapshot().resolutions_failed, 0);
    }
}
