//! Subscriber installation.
//!
//! Human-readable output for terminals, JSON lines for log shippers. Both
//! go to stderr so stdout stays free for the data a command prints.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Build the filter from `config.log_level`.
pub(crate) fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Filter(format!("{}: {e}", config.log_level)))
}

/// Install the global subscriber.
pub(crate) fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = env_filter(config)?;

    if config.json_logs {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_ansi(config.ansi);
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))
    }
}

/// Log a port lifecycle event with the standard `port` and `kind` fields.
///
/// ```
/// use cosim_telemetry::log_port_event;
///
/// log_port_event!(info, 5557, "output_vars", "Port ready", groups = 3);
/// ```
#[macro_export]
macro_rules! log_port_event {
    ($level:ident, $port:expr, $kind:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            port = $port,
            kind = $kind,
            $($($field)*,)?
            $msg
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_filters() {
        for level in ["info", "debug", "cosim_bridge=trace,warn"] {
            let config = TelemetryConfig::default().with_log_level(level);
            assert!(env_filter(&config).is_ok(), "{level}");
        }
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        let config = TelemetryConfig::default().with_log_level("cosim_bridge=loudest");
        assert!(matches!(env_filter(&config), Err(TelemetryError::Filter(_))));
    }
}
