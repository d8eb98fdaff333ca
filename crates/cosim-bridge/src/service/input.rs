//! Input Port
//!
//! Drains control messages from a subscriber once per accepted step and
//! writes each value to every variable bound to the message's group.

use serde::Serialize;
use tracing::{debug, info, trace};

use crate::adapters::transport::TcpSubscriber;
use crate::domain::{wire, GroupId, GroupRegistry, PortConfig, VarHandle};
use crate::error::{ConfigurationError, Result};
use crate::metrics::{DropReason, PortMetrics};
use crate::ports::{Transport, VariableStore};

/// What one [`InputPort::poll`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub received: usize,
    pub writes: usize,
    pub malformed: usize,
    pub unknown_groups: usize,
    /// Stopped at `max_messages_per_step` with at least one message still
    /// pending; it is applied on the next poll.
    pub capped: bool,
}

pub struct InputPort {
    config: PortConfig,
    registry: GroupRegistry,
    transport: Box<dyn Transport>,
    /// Frame read past the cap, applied first on the next poll.
    held: Option<Vec<u8>>,
    closed: bool,
    metrics: PortMetrics,
}

impl InputPort {
    /// Connect a TCP subscriber to `config.endpoint()`.
    pub fn connect(config: PortConfig) -> Result<Self> {
        let transport = TcpSubscriber::connect(&config)?;
        Self::with_transport(config, Box::new(transport))
    }

    pub fn with_transport(config: PortConfig, transport: Box<dyn Transport>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry: GroupRegistry::new(),
            transport,
            held: None,
            closed: false,
            metrics: PortMetrics::new(),
        })
    }

    pub fn add_ref_to_group(
        &mut self,
        group_id: GroupId,
        handle: VarHandle,
    ) -> std::result::Result<(), ConfigurationError> {
        self.registry.add_ref_to_group(group_id, handle, None)?;
        debug!(port = self.config.port_number, group = group_id, %handle, "Bound input variable");
        Ok(())
    }

    pub fn start(&mut self) {
        if !self.registry.is_sealed() {
            self.registry.seal();
            info!(
                port = self.config.port_number,
                groups = self.registry.all_groups().len(),
                "Input port started"
            );
        }
    }

    /// Apply up to `max_messages_per_step` pending control messages.
    pub fn poll(&mut self, store: &mut dyn VariableStore) -> PollReport {
        let mut report = PollReport::default();
        if self.closed {
            return report;
        }
        self.start();

        let limit = self.config.max_messages_per_step.max(1);
        while report.received < limit {
            let Some(frame) = self.held.take().or_else(|| self.transport.try_receive()) else {
                break;
            };
            report.received += 1;
            PortMetrics::incr(&self.metrics.messages_received);

            let message = match wire::decode_control(&frame) {
                Ok(message) => message,
                Err(e) => {
                    report.malformed += 1;
                    self.metrics.record_drop(DropReason::Malformed);
                    debug!(port = self.config.port_number, error = %e, "Dropping inbound message");
                    continue;
                }
            };
            let Some(group_id) = message.group() else {
                report.malformed += 1;
                self.metrics.record_drop(DropReason::Malformed);
                continue;
            };

            let bindings = self.registry.resolve(group_id);
            if bindings.is_empty() {
                report.unknown_groups += 1;
                PortMetrics::incr(&self.metrics.unknown_groups);
                trace!(group = group_id, "Control message for unbound group");
                continue;
            }
            for binding in bindings {
                if store.write(binding.handle, message.value) {
                    report.writes += 1;
                    PortMetrics::incr(&self.metrics.writes_applied);
                } else {
                    PortMetrics::incr(&self.metrics.stale_refs);
                }
            }
        }

        if report.received == limit {
            self.held = self.transport.try_receive();
            if self.held.is_some() {
                report.capped = true;
                PortMetrics::incr(&self.metrics.step_cap_hits);
            }
        }
        report
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.transport.close();
        self.held = None;
        self.closed = true;
        info!(port = self.config.port_number, "Input port closed");
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &GroupRegistry {
        &self.registry
    }

    #[must_use]
    pub fn metrics(&self) -> &PortMetrics {
        &self.metrics
    }

    #[must_use]
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }
}

impl Drop for InputPort {
    fn drop(&mut self) {
        self.close();
    }
}
