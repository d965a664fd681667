pub mod config;
pub mod logging;
pub mod shutdown;

pub use config::{Config, ConfigError, LogLevel};
pub use logging::{LoggingError, init_logging};
pub use shutdown::shutdown_signal;

use crate::event::Event;
use crate::metrics::MetricsExporter;
use crate::shipper::Shipper;
use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

/// The shipped binary: an explicit adapter in place of hidden log-call
/// interception. Reads NDJSON records from stdin, stamps `@timestamp` and
/// `host` when absent, and submits each to the delivery engine.
pub struct App {
    config: Config,
    shipper: Shipper,
}

impl App {
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        config.validate()?;

        info!("Starting logship v{}", crate::VERSION);
        info!(
            server = %config.server,
            queue_capacity = config.queue_capacity,
            overflow_policy = ?config.overflow_policy,
            "configuration loaded"
        );

        let shipper = Shipper::start(config.shipper_config())
            .await
            .context("failed to start shipper")?;

        Ok(Self { config, shipper })
    }

    pub fn shipper(&self) -> &Shipper {
        &self.shipper
    }

    /// Pumps stdin into the shipper until EOF or a termination signal, then
    /// shuts down gracefully.
    pub async fn run(self) -> anyhow::Result<()> {
        if self.config.enable_metrics {
            let exporter = MetricsExporter::new(self.shipper.metrics_handle())
                .context("failed to build metrics exporter")?;
            let port = self.config.metrics_port;
            tokio::spawn(async move {
                if let Err(e) = exporter.start_server(port).await {
                    warn!(error = %e, "metrics server stopped");
                }
            });
        }

        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut malformed = 0u64;

        let signal = shutdown_signal();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => break,
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if line.trim().is_empty() {
                                continue;
                            }
                            match parse_record(&line, &host) {
                                Ok(event) => {
                                    self.shipper.submit(event);
                                }
                                Err(e) => {
                                    malformed += 1;
                                    debug!(error = %e, "skipping malformed input line");
                                }
                            }
                        }
                        Ok(None) => {
                            info!("stdin closed");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "stdin read failed");
                            break;
                        }
                    }
                }
            }
        }

        if malformed > 0 {
            warn!(malformed, "input lines skipped as malformed");
        }

        self.shipper.shutdown().await;

        let snap = self.shipper.metrics();
        info!(
            submitted = snap.events_submitted,
            sent = snap.events_sent,
            dropped = snap.dropped_total(),
            "logship stopped"
        );

        Ok(())
    }
}

fn parse_record(line: &str, host: &str) -> Result<Event, crate::event::SerializationError> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    let mut event = Event::from_value(value)?;

    if !event.contains_field("@timestamp") {
        event.insert(
            "@timestamp",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        );
    }
    if !event.contains_field("host") {
        event.insert("host", host);
    }

    Ok(event)
}

pub async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let config = if let Some(path) = &config.config_file {
        eprintln!("Loading configuration from file: {}", path.display());
        Config::from_file(path)?
    } else {
        config
    };

    init_logging(config.log_level)?;

    let app = App::from_config(config).await?;
    app.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_record_stamps_missing_fields() {
        let event = parse_record(r#"{"message":"hi"}"#, "worker-1").unwrap();
        assert!(event.contains_field("@timestamp"));
        assert_eq!(event.get("host"), Some(&serde_json::json!("worker-1")));
    }

    #[test]
    fn parse_record_keeps_existing_stamps() {
        let event = parse_record(
            r#"{"@timestamp":"2026-01-01T00:00:00Z","host":"other","message":"hi"}"#,
            "worker-1",
        )
        .unwrap();
        assert_eq!(event.get("host"), Some(&serde_json::json!("other")));
        assert_eq!(
            event.get("@timestamp"),
            Some(&serde_json::json!("2026-01-01T00:00:00Z"))
        );
    }

    #[test]
    fn parse_record_rejects_non_objects() {
        assert!(parse_record("[1,2]", "h").is_err());
        assert!(parse_record("not json", "h").is_err());
    }
}
