//! # CoSim Telemetry
//!
//! Logging bootstrap shared by the bridge binaries.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cosim_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("telemetry");
//!     // Bridge logs now go to stderr
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `COSIM_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter |
//! | `COSIM_JSON_LOGS` | `false` | JSON lines output |
//! | `COSIM_SERVICE_NAME` | `cosim` | Name in the startup line |
//! | `NO_COLOR` | unset | Disable ANSI colors |

mod config;
mod logging;

pub use config::TelemetryConfig;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Install the global `tracing` subscriber.
///
/// Returns a guard to hold for the lifetime of the process.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    logging::init_logging(&config)?;
    tracing::info!(
        service = %config.service_name,
        level = %config.log_level,
        json = config.json_logs,
        "Telemetry initialized"
    );
    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}

/// Keeps telemetry active; logs a final line when dropped.
#[derive(Debug)]
pub struct TelemetryGuard {
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::Filter("x=[".to_string());
        assert_eq!(err.to_string(), "Invalid log filter: x=[");
    }
}
