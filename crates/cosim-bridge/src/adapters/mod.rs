//! # Adapters Layer
//!
//! Concrete implementations of the outbound ports, plus TOML loading.

pub mod clock;
pub mod config;
pub mod store;
pub mod transport;

pub use clock::{ManualClock, SystemClock};
pub use config::{PortSection, TomlBridgeConfig, VarBinding};
pub use store::ArenaStore;
