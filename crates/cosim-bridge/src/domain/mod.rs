//! # Domain Layer
//!
//! Pure bridge logic: message layouts, group bookkeeping, configuration
//! and timing arithmetic.
//!
//! ## Hexagonal Architecture
//!
//! This module contains NO I/O dependencies. Sockets, clocks and the
//! simulation's variable storage are reached through the traits in
//! [`crate::ports`].

pub mod config;
pub mod entities;
pub mod pacing;
pub mod registry;
pub mod wire;

pub use config::{PortConfig, PortConfigBuilder, RateConfig};
pub use entities::{
    Binding, ControlMessage, EventRecord, Group, GroupId, Sample, VarHandle, DEFAULT_WEIGHT,
};
pub use pacing::{sleep_target, step_budget, Cadence};
pub use registry::GroupRegistry;
