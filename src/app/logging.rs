use super::config::LogLevel;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to build log filter: {0}")]
    FilterError(String),
    #[error("Failed to set global subscriber: {0}")]
    SubscriberError(String),
}

/// Initializes the global tracing subscriber. `RUST_LOG` wins over the
/// configured level; dependency chatter is kept at warn.
pub fn init_logging(level: LogLevel) -> Result<(), LoggingError> {
    let default_directives = format!(
        "{},trust_dns_resolver=warn,warp=warn,hyper=warn",
        tracing::Level::from(level)
    );

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&default_directives)
            .map_err(|e| LoggingError::FilterError(e.to_string()))?,
    };

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_target(true)
            .with_level(true)
            .compact(),
    );

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggingError::SubscriberError(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn double_init_errors_instead_of_panicking() {
        let first = init_logging(LogLevel::Info);
        assert!(first.is_ok());
        let second = init_logging(LogLevel::Debug);
        assert!(matches!(second, Err(LoggingError::SubscriberError(_))));
    }
}
