//! # Ports Layer
//!
//! - **Driving Ports (Inbound)**: the binding interface the simulation engine calls.
//! - **Driven Ports (Outbound)**: transport, variable storage and clock the
//!   bridge calls out to.

pub mod inbound;
pub mod outbound;

pub use inbound::CoSimApi;
pub use outbound::{Clock, Delivery, Transport, TransportRole, TransportStats, VariableStore};
