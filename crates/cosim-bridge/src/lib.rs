//! # CoSim Bridge
//!
//! Real-time co-simulation bridge: lets a running numerical simulation
//! exchange live state with external processes over a pub/sub transport
//! while pacing the simulation against wall-clock time.
//!
//! ## Architecture
//!
//! This crate follows Hexagonal Architecture (Ports & Adapters):
//!
//! - **Domain Layer** (`domain/`): Pure logic, no I/O
//!   - `wire`: Fixed binary layouts of samples, events and control messages
//!   - `GroupRegistry`: Group id to bound variables
//!   - `PortConfig` / `RateConfig`: Validated settings
//!   - `Cadence`: Sample and flush boundaries in simulation time
//!
//! - **Ports Layer** (`ports/`): Trait definitions
//!   - `CoSimApi`: Driving port the simulation engine calls
//!   - `Transport`, `VariableStore`, `Clock`: Driven ports
//!
//! - **Service Layer** (`service/`): Orchestration
//!   - `OutputVarsPort`, `OutputEventsPort`, `InputPort`, `RateController`
//!   - `CoSimBridge`: Runs all of them once per accepted integrator step
//!
//! - **Adapters Layer** (`adapters/`): TCP and in-memory transports,
//!   arena variable store, clocks, TOML configuration
//!
//! ## Wire Compatibility
//!
//! The TCP transport frames each message with a 4-byte big-endian length
//! prefix (see [`adapters::transport::framing`]). It does not speak ZeroMQ:
//! `zmq.PUB`/`zmq.SUB` peers, such as Python `pyzmq` scripts, cannot connect
//! to these ports. Message payloads are the fixed layouts in
//! [`domain::wire`], so a peer only needs the length prefix to interoperate.
//!
//! ## Data Flow
//!
//! ```text
//!  integrator step ──► CoSimBridge::advance_step
//!                         │
//!      ┌──────────────────┼─────────────────────┬──────────────────┐
//!      ▼                  ▼                     ▼                  ▼
//!  InputPort         OutputVarsPort      OutputEventsPort    RateController
//!  (SUB, writes)     (PUB, samples)      (PUB, events)       (sleep)
//! ```
//!
//! ## Example
//!
//! ```
//! use cosim_bridge::adapters::{transport::MemoryHub, ArenaStore};
//! use cosim_bridge::{CoSimApi, CoSimBridge, OutputVarsPort, PortConfig};
//!
//! let hub = MemoryHub::new("doc", 64);
//! let config = PortConfig::builder(5557).flush_period(5.0).build().unwrap();
//! let port = OutputVarsPort::with_transport(config, Box::new(hub.publisher())).unwrap();
//!
//! let mut store = ArenaStore::new();
//! let v = store.push(-65.0);
//!
//! let mut bridge = CoSimBridge::new();
//! let vars = bridge.attach(port).unwrap();
//! bridge.bind_scalar(vars, 1, v, Some(888.0)).unwrap();
//! bridge.begin(0.0);
//!
//! let mut t = 0.0;
//! while t < 5.0 {
//!     t += 0.025;
//!     bridge.advance_step(t, 0.025, &mut store);
//! }
//! bridge.shutdown();
//! assert_eq!(bridge.report().ports[0].metrics.flushes, 1);
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod adapters;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;
pub mod stop;

pub use domain::{
    ControlMessage, EventRecord, GroupId, GroupRegistry, PortConfig, RateConfig, Sample,
    VarHandle,
};
pub use error::{BridgeError, ConfigurationError, Result, WireError};
pub use metrics::{MetricsSnapshot, PortMetrics};
pub use ports::{Clock, CoSimApi, Transport, TransportRole, VariableStore};
pub use service::{
    BridgeReport, CoSimBridge, InputPort, OutputEventsPort, OutputVarsPort, Pace, PortId,
    RateController,
};
pub use stop::StopSignal;
