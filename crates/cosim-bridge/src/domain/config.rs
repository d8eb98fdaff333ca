//! Port and pacing configuration
//!
//! Configuration is fixed at construction. A port validates its
//! [`PortConfig`] once, when it is built, and never accepts changes after.
//!
//! # Example
//!
//! ```
//! use cosim_bridge::domain::PortConfig;
//!
//! let config = PortConfig::builder(5557)
//!     .sample_period(1.0)
//!     .flush_period(5.0)
//!     .build()
//!     .expect("valid config");
//! assert_eq!(config.endpoint(), "0.0.0.0:5557");
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Default host a publisher binds to.
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";
/// Default host a subscriber connects to.
pub const DEFAULT_CONNECT_HOST: &str = "127.0.0.1";
/// Default simulation-time sample period.
pub const DEFAULT_SAMPLE_PERIOD: f64 = 1.0;
/// Samples retained between flushes before the oldest are dropped.
pub const DEFAULT_MAX_BUFFERED_SAMPLES: usize = 100_000;
/// Inbound messages applied per step before the rest wait for the next step.
pub const DEFAULT_MAX_MESSAGES_PER_STEP: usize = 1024;
/// How long a blocking subscriber keeps retrying its connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings of one port, immutable once the run starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortConfig {
    pub port_number: u16,
    /// Host to bind (publishers) or connect to (subscribers).
    pub host: String,
    pub blocking_socket: bool,
    /// Require an upstream acknowledgment before events are published.
    pub use_icp: bool,
    /// Simulation time between samples.
    pub sample_period: f64,
    /// Simulation time between flushes of the sample buffer.
    pub flush_period: f64,
    pub max_buffered_samples: usize,
    pub max_messages_per_step: usize,
    pub connect_timeout: Duration,
}

impl PortConfig {
    /// Start building a config for `port_number`.
    #[must_use]
    pub fn builder(port_number: u16) -> PortConfigBuilder {
        PortConfigBuilder::new(port_number)
    }

    /// `host:port` string used for bind/connect.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port_number)
    }

    /// Reject settings that cannot work.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.port_number == 0 {
            return Err(ConfigurationError::InvalidPortNumber(0));
        }
        if !(self.sample_period.is_finite() && self.sample_period > 0.0) {
            return Err(ConfigurationError::InvalidSamplePeriod(self.sample_period));
        }
        Ok(())
    }

    /// Flush period actually used: never shorter than the sample period.
    ///
    /// A flush period below the sample period collapses to flushing after
    /// every sample.
    #[must_use]
    pub fn effective_flush_period(&self) -> f64 {
        if self.flush_period.is_finite() && self.flush_period >= self.sample_period {
            self.flush_period
        } else {
            self.sample_period
        }
    }
}

/// Fluent builder for [`PortConfig`].
#[derive(Clone, Debug)]
pub struct PortConfigBuilder {
    port_number: i64,
    host: Option<String>,
    blocking_socket: bool,
    use_icp: bool,
    sample_period: f64,
    flush_period: Option<f64>,
    max_buffered_samples: usize,
    max_messages_per_step: usize,
    connect_timeout: Duration,
}

impl PortConfigBuilder {
    fn new(port_number: u16) -> Self {
        Self {
            port_number: i64::from(port_number),
            host: None,
            blocking_socket: false,
            use_icp: false,
            sample_period: DEFAULT_SAMPLE_PERIOD,
            flush_period: None,
            max_buffered_samples: DEFAULT_MAX_BUFFERED_SAMPLES,
            max_messages_per_step: DEFAULT_MAX_MESSAGES_PER_STEP,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Builder for a port number coming from an untyped source (config file, CLI).
    #[must_use]
    pub fn from_raw_port(port_number: i64) -> Self {
        let mut builder = Self::new(0);
        builder.port_number = port_number;
        builder
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn blocking_socket(mut self, blocking: bool) -> Self {
        self.blocking_socket = blocking;
        self
    }

    #[must_use]
    pub fn use_icp(mut self, use_icp: bool) -> Self {
        self.use_icp = use_icp;
        self
    }

    #[must_use]
    pub fn sample_period(mut self, period: f64) -> Self {
        self.sample_period = period;
        self
    }

    #[must_use]
    pub fn flush_period(mut self, period: f64) -> Self {
        self.flush_period = Some(period);
        self
    }

    #[must_use]
    pub fn max_buffered_samples(mut self, max: usize) -> Self {
        self.max_buffered_samples = max.max(1);
        self
    }

    #[must_use]
    pub fn max_messages_per_step(mut self, max: usize) -> Self {
        self.max_messages_per_step = max.max(1);
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Validate and build. The host defaults depend on the role, so an
    /// unset host is filled with [`DEFAULT_BIND_HOST`]; subscribers use
    /// [`PortConfigBuilder::build_for_subscriber`].
    pub fn build(self) -> Result<PortConfig, ConfigurationError> {
        self.finish(DEFAULT_BIND_HOST)
    }

    /// Like [`build`](Self::build) but defaults the host to loopback.
    pub fn build_for_subscriber(self) -> Result<PortConfig, ConfigurationError> {
        self.finish(DEFAULT_CONNECT_HOST)
    }

    fn finish(self, default_host: &str) -> Result<PortConfig, ConfigurationError> {
        let port_number = u16::try_from(self.port_number)
            .ok()
            .filter(|&p| p != 0)
            .ok_or(ConfigurationError::InvalidPortNumber(self.port_number))?;

        let config = PortConfig {
            port_number,
            host: self.host.unwrap_or_else(|| default_host.to_string()),
            blocking_socket: self.blocking_socket,
            use_icp: self.use_icp,
            sample_period: self.sample_period,
            flush_period: self.flush_period.unwrap_or(self.sample_period),
            max_buffered_samples: self.max_buffered_samples,
            max_messages_per_step: self.max_messages_per_step,
            connect_timeout: self.connect_timeout,
        };
        config.validate()?;

        if config.effective_flush_period() != config.flush_period {
            tracing::warn!(
                port = config.port_number,
                sample_period = config.sample_period,
                flush_period = config.flush_period,
                "Flush period shorter than sample period; flushing after every sample"
            );
        }
        Ok(config)
    }
}

/// Real-time pacing settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateConfig {
    /// Wall-clock seconds per simulated second; 10 runs ten times slower
    /// than real time, 0 disables pacing.
    pub rate: f64,
    /// Seconds represented by one unit of simulation time.
    pub time_unit: f64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            rate: 1.0,
            time_unit: 1e-3,
        }
    }
}

impl RateConfig {
    pub fn new(rate: f64, time_unit: f64) -> Result<Self, ConfigurationError> {
        let config = Self { rate, time_unit };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.rate.is_finite() && self.rate >= 0.0) {
            return Err(ConfigurationError::InvalidRate(self.rate));
        }
        if !(self.time_unit.is_finite() && self.time_unit > 0.0) {
            return Err(ConfigurationError::InvalidTimeUnit(self.time_unit));
        }
        Ok(())
    }
}
