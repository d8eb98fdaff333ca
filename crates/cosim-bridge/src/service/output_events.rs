//! Output Events Port
//!
//! Publishes one [`EventRecord`] per event occurrence, immediately.
//!
//! With `use_icp` the port starts not ready: bindings made before the
//! subscriber's acknowledgment are queued and applied once `ACK\0` arrives
//! upstream, and events raised before then are dropped. The port never
//! waits for the acknowledgment; [`OutputEventsPort::refresh`] polls for it
//! once per step.

use tracing::{debug, info, trace};

use crate::adapters::transport::TcpPublisher;
use crate::domain::{wire, EventRecord, GroupId, GroupRegistry, PortConfig, VarHandle};
use crate::error::{ConfigurationError, Result};
use crate::metrics::{DropReason, PortMetrics};
use crate::ports::Transport;

pub struct OutputEventsPort {
    config: PortConfig,
    registry: GroupRegistry,
    /// Bindings waiting for the ICP acknowledgment.
    pending: Vec<(GroupId, VarHandle)>,
    transport: Box<dyn Transport>,
    ready: bool,
    started: bool,
    closed: bool,
    sequence: u32,
    metrics: PortMetrics,
}

impl OutputEventsPort {
    pub fn bind(config: PortConfig) -> Result<Self> {
        let transport = TcpPublisher::bind(&config)?;
        Self::with_transport(config, Box::new(transport))
    }

    pub fn with_transport(config: PortConfig, transport: Box<dyn Transport>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ready: !config.use_icp,
            config,
            registry: GroupRegistry::new(),
            pending: Vec::new(),
            transport,
            started: false,
            closed: false,
            sequence: 0,
            metrics: PortMetrics::new(),
        })
    }

    /// Bind an event source to `group_id`.
    pub fn add_ref_to_group(
        &mut self,
        group_id: GroupId,
        handle: VarHandle,
    ) -> std::result::Result<(), ConfigurationError> {
        if self.started {
            return Err(ConfigurationError::LateBinding { group: group_id });
        }
        if self.ready {
            self.registry.add_ref_to_group(group_id, handle, None)
        } else {
            debug!(port = self.config.port_number, group = group_id, %handle, "Queued binding until acknowledged");
            self.pending.push((group_id, handle));
            Ok(())
        }
    }

    /// Close the configuration phase. Bindings still pending are applied
    /// when the acknowledgment arrives.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        if self.ready {
            self.registry.seal();
        }
        info!(
            port = self.config.port_number,
            use_icp = self.config.use_icp,
            ready = self.ready,
            "Output events port started"
        );
    }

    /// Poll upstream for the ICP acknowledgment. No-op once ready.
    pub fn refresh(&mut self) {
        if self.ready || self.closed {
            return;
        }
        while let Some(frame) = self.transport.try_receive() {
            PortMetrics::incr(&self.metrics.messages_received);
            if wire::is_ack(&frame) {
                self.acknowledge();
                return;
            }
            self.metrics.record_drop(DropReason::Malformed);
        }
    }

    fn acknowledge(&mut self) {
        for (group_id, handle) in std::mem::take(&mut self.pending) {
            if let Err(e) = self.registry.add_ref_to_group(group_id, handle, None) {
                debug!(error = %e, "Dropping queued binding");
            }
        }
        if self.started {
            self.registry.seal();
        }
        self.ready = true;
        info!(
            port = self.config.port_number,
            bindings = self.registry.binding_count(),
            "Subscriber acknowledged; publishing events"
        );
    }

    /// Publish an event for `group_id`.
    pub fn on_event(&mut self, group_id: GroupId) {
        if self.closed {
            return;
        }
        if !self.ready {
            self.metrics.record_drop(DropReason::PreReady);
            return;
        }
        self.registry.seal();

        let record = EventRecord {
            group_id,
            sequence: self.sequence,
        };
        self.sequence = self.sequence.wrapping_add(1);

        let delivery = self.transport.send(&wire::encode_event(&record));
        if delivery.queued > 0 {
            PortMetrics::incr(&self.metrics.events_sent);
        }
        if delivery.dropped > 0 {
            self.metrics.record_drop(DropReason::Backpressure);
        }
        trace!(port = self.config.port_number, group = group_id, sequence = record.sequence, "Event");
    }

    /// Publish an event for whichever group `handle` is bound to.
    pub fn on_source_event(&mut self, handle: VarHandle) {
        if self.closed {
            return;
        }
        if !self.ready {
            self.metrics.record_drop(DropReason::PreReady);
            return;
        }
        match self.registry.group_of(handle) {
            Some(group_id) => self.on_event(group_id),
            None => {
                PortMetrics::incr(&self.metrics.unbound_sources);
                trace!(%handle, "Event from unbound source");
            }
        }
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.transport.close();
        self.closed = true;
        info!(port = self.config.port_number, "Output events port closed");
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Sequence number the next event will carry.
    #[must_use]
    pub fn next_sequence(&self) -> u32 {
        self.sequence
    }

    #[must_use]
    pub fn pending_bindings(&self) -> usize {
        self.pending.len()
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

impl Drop for OutputEventsPort {
    fn drop(&mut self) {
        self.close();
    }
}
