//! # Inbound Ports (Driving Ports)
//!
//! The binding interface the simulation engine drives. Configuration calls
//! happen before [`CoSimApi::begin`]; afterwards the engine only advances
//! steps, reports events and finally shuts the bridge down.

use crate::domain::{GroupId, VarHandle};
use crate::error::Result;
use crate::ports::outbound::VariableStore;
use crate::service::{BridgeReport, PortId};

pub trait CoSimApi {
    /// Bind a simulation scalar to a group of a port.
    fn bind_scalar(
        &mut self,
        port: PortId,
        group_id: GroupId,
        handle: VarHandle,
        weight: Option<f64>,
    ) -> Result<()>;

    /// Seal all ports and anchor their cadences at simulation time `t0`.
    fn begin(&mut self, t0: f64);

    /// Run the bridge for one accepted integrator step ending at `t`.
    ///
    /// Returns `false` once a stop was requested; the caller should leave
    /// its integration loop and call [`CoSimApi::shutdown`].
    fn advance_step(&mut self, t: f64, dt: f64, store: &mut dyn VariableStore) -> bool;

    /// An event occurred for `group_id` on an events port.
    ///
    /// Fails only if `port` is not an events port of this bridge.
    fn on_event(&mut self, port: PortId, group_id: GroupId) -> Result<()>;

    /// Abort any pending sleep, flush buffered samples and close every
    /// socket. Calling it again is a no-op.
    fn shutdown(&mut self);

    fn report(&self) -> BridgeReport;
}
