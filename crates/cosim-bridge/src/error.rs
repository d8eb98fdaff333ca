//! Error types for the co-simulation bridge
//!
//! Only configuration-time failures are errors. Anything that goes wrong in
//! the per-step hot path (malformed packets, full send queues, events raised
//! before the ICP handshake) is counted in [`crate::metrics::PortMetrics`]
//! and the offending message is dropped.

use crate::domain::GroupId;
use crate::ports::TransportRole;
use thiserror::Error;

/// Result alias for fallible bridge setup operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Fatal errors raised while configuring or constructing ports.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Transport setup failed ({role:?} on {endpoint}): {source}")]
    TransportSetup {
        role: TransportRole,
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
}

/// Invalid configuration detected before the run starts.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid port number: {0} (must be 1-65535)")]
    InvalidPortNumber(i64),

    #[error("Invalid sample period: {0} (must be > 0)")]
    InvalidSamplePeriod(f64),

    #[error("Invalid real-time rate: {0} (must be finite and >= 0)")]
    InvalidRate(f64),

    #[error("Invalid time unit: {0} seconds (must be > 0)")]
    InvalidTimeUnit(f64),

    #[error("Invalid weight {weight} for group {group}")]
    InvalidWeight { group: GroupId, weight: f64 },

    #[error("Late binding to group {group}: ports are sealed once the run has started")]
    LateBinding { group: GroupId },

    #[error("Ports cannot be added once the run has started")]
    AlreadyStarted,

    #[error("Unknown port id: {0}")]
    UnknownPort(usize),

    #[error("Port {port} is a {actual} port, expected {expected}")]
    WrongPortKind {
        port: usize,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Failed to read {path}: {error}")]
    Io { path: String, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

/// Decoding failure for a single inbound frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WireError {
    #[error("Malformed {kind} message: {reason}")]
    MalformedMessage { kind: &'static str, reason: String },
}

impl WireError {
    pub(crate) fn length(kind: &'static str, expected: &str, actual: usize) -> Self {
        Self::MalformedMessage {
            kind,
            reason: format!("expected {expected} bytes, got {actual}"),
        }
    }

    pub(crate) fn group_id(kind: &'static str, raw: f64) -> Self {
        Self::MalformedMessage {
            kind,
            reason: format!("group id {raw} is not a non-negative integer in u32 range"),
        }
    }
}
