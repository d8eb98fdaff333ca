//! Co-Simulation Bridge
//!
//! Owns every port of a run plus the optional rate controller, and drives
//! them from the integrator's step loop.
//!
//! ## Step order
//!
//! 1. Stop check
//! 2. Input ports poll (external writes land before sampling)
//! 3. Output vars ports sample and flush
//! 4. Output events ports poll for their acknowledgment
//! 5. Rate controller paces
//!
//! Events are reported through [`CoSimBridge::on_event`] whenever the
//! engine detects them during the step.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{GroupId, PortConfig, RateConfig, VarHandle};
use crate::error::{ConfigurationError, Result};
use crate::metrics::{MetricsSnapshot, PortMetrics};
use crate::ports::{Clock, CoSimApi, Transport, TransportStats, VariableStore};
use crate::service::input::InputPort;
use crate::service::output_events::OutputEventsPort;
use crate::service::output_vars::OutputVarsPort;
use crate::service::rate_controller::{Pace, RateController, RateReport};
use crate::stop::StopSignal;

/// Index of a port within its bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PortId(usize);

impl PortId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port#{}", self.0)
    }
}

/// A port owned by the bridge.
pub enum BridgePort {
    OutputVars(OutputVarsPort),
    OutputEvents(OutputEventsPort),
    Input(InputPort),
}

impl BridgePort {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OutputVars(_) => "output_vars",
            Self::OutputEvents(_) => "output_events",
            Self::Input(_) => "input",
        }
    }

    fn config(&self) -> &PortConfig {
        match self {
            Self::OutputVars(p) => p.config(),
            Self::OutputEvents(p) => p.config(),
            Self::Input(p) => p.config(),
        }
    }

    fn metrics(&self) -> &PortMetrics {
        match self {
            Self::OutputVars(p) => p.metrics(),
            Self::OutputEvents(p) => p.metrics(),
            Self::Input(p) => p.metrics(),
        }
    }

    fn transport(&self) -> &dyn Transport {
        match self {
            Self::OutputVars(p) => p.transport(),
            Self::OutputEvents(p) => p.transport(),
            Self::Input(p) => p.transport(),
        }
    }

    fn binding_count(&self) -> usize {
        match self {
            Self::OutputVars(p) => p.registry().binding_count(),
            Self::OutputEvents(p) => p.registry().binding_count() + p.pending_bindings(),
            Self::Input(p) => p.registry().binding_count(),
        }
    }

    fn close(&mut self) {
        match self {
            Self::OutputVars(p) => p.close(),
            Self::OutputEvents(p) => p.close(),
            Self::Input(p) => p.close(),
        }
    }
}

impl From<OutputVarsPort> for BridgePort {
    fn from(port: OutputVarsPort) -> Self {
        Self::OutputVars(port)
    }
}

impl From<OutputEventsPort> for BridgePort {
    fn from(port: OutputEventsPort) -> Self {
        Self::OutputEvents(port)
    }
}

impl From<InputPort> for BridgePort {
    fn from(port: InputPort) -> Self {
        Self::Input(port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortReport {
    pub id: PortId,
    pub kind: &'static str,
    pub port_number: u16,
    pub endpoint: String,
    pub bindings: usize,
    pub metrics: MetricsSnapshot,
    pub transport: TransportStats,
}

/// Serializable summary of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeReport {
    pub steps: u64,
    pub last_time: f64,
    pub stopped: bool,
    pub ports: Vec<PortReport>,
    pub rate: Option<RateReport>,
}

pub struct CoSimBridge {
    ports: Vec<BridgePort>,
    rate: Option<RateController>,
    stop: StopSignal,
    started: bool,
    closed: bool,
    steps: u64,
    last_time: f64,
}

impl Default for CoSimBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl CoSimBridge {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ports: Vec::new(),
            rate: None,
            stop: StopSignal::new(),
            started: false,
            closed: false,
            steps: 0,
            last_time: 0.0,
        }
    }

    /// Pace steps against the system clock.
    #[must_use]
    pub fn with_rate(mut self, config: RateConfig) -> Self {
        self.rate = Some(RateController::new(config, self.stop.clone()));
        self
    }

    /// Pace steps against `clock`.
    #[must_use]
    pub fn with_rate_clock(mut self, config: RateConfig, clock: Arc<dyn Clock>) -> Self {
        self.rate = Some(RateController::with_clock(config, clock, self.stop.clone()));
        self
    }

    /// Bind a TCP publisher for sampled variables.
    pub fn add_output_vars(&mut self, config: PortConfig) -> Result<PortId> {
        self.ensure_configurable()?;
        let port = OutputVarsPort::bind(config)?;
        Ok(self.push(port.into()))
    }

    /// Bind a TCP publisher for events.
    pub fn add_output_events(&mut self, config: PortConfig) -> Result<PortId> {
        self.ensure_configurable()?;
        let port = OutputEventsPort::bind(config)?;
        Ok(self.push(port.into()))
    }

    /// Connect a TCP subscriber for control messages.
    pub fn add_input(&mut self, config: PortConfig) -> Result<PortId> {
        self.ensure_configurable()?;
        let port = InputPort::connect(config)?;
        Ok(self.push(port.into()))
    }

    /// Add a port built over a custom transport.
    pub fn attach(&mut self, port: impl Into<BridgePort>) -> Result<PortId> {
        self.ensure_configurable()?;
        Ok(self.push(port.into()))
    }

    fn push(&mut self, port: BridgePort) -> PortId {
        let id = PortId(self.ports.len());
        info!(port = %id, kind = port.kind(), endpoint = port.transport().endpoint(), "Port added");
        self.ports.push(port);
        id
    }

    fn ensure_configurable(&self) -> std::result::Result<(), ConfigurationError> {
        if self.started {
            return Err(ConfigurationError::AlreadyStarted);
        }
        Ok(())
    }

    fn port_mut(&mut self, id: PortId) -> std::result::Result<&mut BridgePort, ConfigurationError> {
        self.ports
            .get_mut(id.0)
            .ok_or(ConfigurationError::UnknownPort(id.0))
    }

    /// Ids of every port, in the order they were added.
    pub fn port_ids(&self) -> impl Iterator<Item = PortId> {
        (0..self.ports.len()).map(PortId)
    }

    #[must_use]
    pub fn port(&self, id: PortId) -> Option<&BridgePort> {
        self.ports.get(id.0)
    }

    #[must_use]
    pub fn output_vars(&self, id: PortId) -> Option<&OutputVarsPort> {
        match self.ports.get(id.0) {
            Some(BridgePort::OutputVars(p)) => Some(p),
            _ => None,
        }
    }

    #[must_use]
    pub fn output_events(&self, id: PortId) -> Option<&OutputEventsPort> {
        match self.ports.get(id.0) {
            Some(BridgePort::OutputEvents(p)) => Some(p),
            _ => None,
        }
    }

    #[must_use]
    pub fn input(&self, id: PortId) -> Option<&InputPort> {
        match self.ports.get(id.0) {
            Some(BridgePort::Input(p)) => Some(p),
            _ => None,
        }
    }

    /// Cloneable handle that stops the run, e.g. from a signal handler.
    #[must_use]
    pub fn stop_handle(&self) -> StopSignal {
        self.stop.clone()
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Publish an event for whichever group `handle` is bound to on `port`.
    pub fn on_source_event(&mut self, port: PortId, handle: VarHandle) -> Result<()> {
        match self.port_mut(port)? {
            BridgePort::OutputEvents(p) => {
                p.on_source_event(handle);
                Ok(())
            }
            other => Err(wrong_kind(port, "output_events", other).into()),
        }
    }
}

fn wrong_kind(port: PortId, expected: &'static str, actual: &BridgePort) -> ConfigurationError {
    ConfigurationError::WrongPortKind {
        port: port.0,
        expected,
        actual: actual.kind(),
    }
}

impl CoSimApi for CoSimBridge {
    fn bind_scalar(
        &mut self,
        port: PortId,
        group_id: GroupId,
        handle: VarHandle,
        weight: Option<f64>,
    ) -> Result<()> {
        if self.started {
            return Err(ConfigurationError::LateBinding { group: group_id }.into());
        }
        match self.port_mut(port)? {
            BridgePort::OutputVars(p) => p.add_ref_to_group(group_id, handle, weight)?,
            BridgePort::OutputEvents(p) => {
                if weight.is_some() {
                    warn!(%port, group = group_id, "Ignoring weight on an events port");
                }
                p.add_ref_to_group(group_id, handle)?;
            }
            BridgePort::Input(p) => {
                if weight.is_some() {
                    warn!(%port, group = group_id, "Ignoring weight on an input port");
                }
                p.add_ref_to_group(group_id, handle)?;
            }
        }
        Ok(())
    }

    fn begin(&mut self, t0: f64) {
        if self.started || self.closed {
            return;
        }
        for port in &mut self.ports {
            match port {
                BridgePort::OutputVars(p) => p.start(t0),
                BridgePort::OutputEvents(p) => p.start(),
                BridgePort::Input(p) => p.start(),
            }
        }
        if let Some(rate) = &mut self.rate {
            rate.reset();
        }
        self.started = true;
        self.last_time = t0;
        info!(ports = self.ports.len(), t0, paced = self.rate.is_some(), "Bridge started");
    }

    fn advance_step(&mut self, t: f64, dt: f64, store: &mut dyn VariableStore) -> bool {
        if self.closed || self.stop.is_stopped() {
            return false;
        }
        if !self.started {
            self.begin(t - dt);
        }

        for port in &mut self.ports {
            if let BridgePort::Input(p) = port {
                p.poll(store);
            }
        }
        for port in &mut self.ports {
            match port {
                BridgePort::OutputVars(p) => p.on_step(t, store),
                BridgePort::OutputEvents(p) => p.refresh(),
                BridgePort::Input(_) => {}
            }
        }

        self.steps += 1;
        self.last_time = t;

        match self.rate.as_mut().map(|rate| rate.pace(dt)) {
            Some(Pace::Stopped) => false,
            Some(Pace::Continue) | None => !self.stop.is_stopped(),
        }
    }

    fn on_event(&mut self, port: PortId, group_id: GroupId) -> Result<()> {
        match self.port_mut(port)? {
            BridgePort::OutputEvents(p) => {
                p.on_event(group_id);
                Ok(())
            }
            other => Err(wrong_kind(port, "output_events", other).into()),
        }
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.stop.stop();
        for port in &mut self.ports {
            port.close();
        }
        self.closed = true;
        info!(steps = self.steps, last_time = self.last_time, "Bridge shut down");
    }

    fn report(&self) -> BridgeReport {
        BridgeReport {
            steps: self.steps,
            last_time: self.last_time,
            stopped: self.stop.is_stopped(),
            ports: self
                .ports
                .iter()
                .enumerate()
                .map(|(i, port)| PortReport {
                    id: PortId(i),
                    kind: port.kind(),
                    port_number: port.config().port_number,
                    endpoint: port.transport().endpoint().to_string(),
                    bindings: port.binding_count(),
                    metrics: port.metrics().snapshot(),
                    transport: port.transport().stats(),
                })
                .collect(),
            rate: self.rate.as_ref().map(RateController::report),
        }
    }
}

impl Drop for CoSimBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}
