//! # CoSim Runtime
//!
//! Command-line driver for the co-simulation bridge.
//!
//! - `cosim run`: integrate the demo network with ports from a TOML file
//! - `cosim send`: publish control messages for an input port to consume
//! - `cosim listen`: subscribe to an output port and print what arrives

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod cli;
pub mod commands;
pub mod model;
