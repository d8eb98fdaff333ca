//! Service Layer
//!
//! The port objects, the rate controller, and the bridge that drives them
//! from the integrator's step loop.

pub mod bridge;
pub mod input;
pub mod output_events;
pub mod output_vars;
pub mod rate_controller;

pub use bridge::{BridgePort, BridgeReport, CoSimBridge, PortId, PortReport};
pub use input::{InputPort, PollReport};
pub use output_events::OutputEventsPort;
pub use output_vars::{OutputVarsPort, VarsPortState};
pub use rate_controller::{Pace, RateController, RateReport};
