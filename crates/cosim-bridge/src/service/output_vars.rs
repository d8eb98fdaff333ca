//! Output Vars Port
//!
//! Samples bound scalars on the sample cadence and publishes the buffered
//! samples on the coarser flush cadence.
//!
//! ```text
//! Idle ──start──► Sampling ──flush due──► Flushing ──sent──► Sampling
//!                    │                                          │
//!                    └─────────────────close────────────────────┴──► Closed
//! ```

use std::collections::VecDeque;

use tracing::{debug, info, trace};

use crate::adapters::transport::TcpPublisher;
use crate::domain::{wire, Cadence, GroupId, GroupRegistry, PortConfig, Sample, VarHandle};
use crate::error::{ConfigurationError, Result};
use crate::metrics::{DropReason, PortMetrics};
use crate::ports::{Transport, VariableStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarsPortState {
    Idle,
    Sampling,
    Flushing,
    Closed,
}

pub struct OutputVarsPort {
    config: PortConfig,
    registry: GroupRegistry,
    transport: Box<dyn Transport>,
    state: VarsPortState,
    sample_cadence: Cadence,
    flush_cadence: Cadence,
    buffer: VecDeque<Sample>,
    metrics: PortMetrics,
}

impl OutputVarsPort {
    /// Bind a TCP publisher on `config.endpoint()`.
    pub fn bind(config: PortConfig) -> Result<Self> {
        let transport = TcpPublisher::bind(&config)?;
        Self::with_transport(config, Box::new(transport))
    }

    /// Build the port over an already constructed publisher.
    pub fn with_transport(config: PortConfig, transport: Box<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let flush_period = config.effective_flush_period();
        Ok(Self {
            sample_cadence: Cadence::new(config.sample_period, 0.0),
            flush_cadence: Cadence::new(flush_period, 0.0),
            config,
            registry: GroupRegistry::new(),
            transport,
            state: VarsPortState::Idle,
            buffer: VecDeque::new(),
            metrics: PortMetrics::new(),
        })
    }

    /// Bind `handle` to `group_id`; its value is multiplied by `weight`
    /// (default 1.0) when sampled.
    pub fn add_ref_to_group(
        &mut self,
        group_id: GroupId,
        handle: VarHandle,
        weight: Option<f64>,
    ) -> std::result::Result<(), ConfigurationError> {
        self.registry.add_ref_to_group(group_id, handle, weight)?;
        debug!(port = self.config.port_number, group = group_id, %handle, "Bound variable");
        Ok(())
    }

    /// Seal the bindings and anchor both cadences at `t0`. The first sample
    /// is taken at `t0 + sample_period`.
    pub fn start(&mut self, t0: f64) {
        if self.state != VarsPortState::Idle {
            return;
        }
        self.registry.seal();
        self.sample_cadence = Cadence::new(self.config.sample_period, t0);
        self.flush_cadence = Cadence::new(self.config.effective_flush_period(), t0);
        self.state = VarsPortState::Sampling;
        info!(
            port = self.config.port_number,
            groups = self.registry.all_groups().len(),
            bindings = self.registry.binding_count(),
            t0,
            "Output vars port started"
        );
    }

    /// Called once per accepted integrator step ending at `t`.
    pub fn on_step(&mut self, t: f64, store: &dyn VariableStore) {
        match self.state {
            VarsPortState::Closed => return,
            VarsPortState::Idle => self.start(t),
            VarsPortState::Sampling | VarsPortState::Flushing => {}
        }

        if self.sample_cadence.is_due(t) {
            self.take_samples(t, store);
            self.sample_cadence.consume(t);
        }
        if self.flush_cadence.is_due(t) {
            self.flush();
            self.flush_cadence.consume(t);
        }
    }

    fn take_samples(&mut self, t: f64, store: &dyn VariableStore) {
        let cap = self.config.max_buffered_samples.max(1);
        for group in self.registry.groups() {
            for binding in group.bindings() {
                let Some(value) = store.read(binding.handle) else {
                    PortMetrics::incr(&self.metrics.stale_refs);
                    trace!(group = group.id(), handle = %binding.handle, "Skipping unreadable variable");
                    continue;
                };
                if self.buffer.len() >= cap {
                    self.buffer.pop_front();
                    self.metrics.record_drop(DropReason::Overflow);
                }
                self.buffer.push_back(Sample {
                    group_id: group.id(),
                    timestamp: t,
                    value: value * binding.weight,
                });
                PortMetrics::incr(&self.metrics.samples_taken);
            }
        }
    }

    /// Send every buffered sample, oldest first, and clear the buffer.
    fn flush(&mut self) {
        self.state = VarsPortState::Flushing;
        let batch = self.buffer.len();
        for sample in self.buffer.drain(..) {
            let delivery = self.transport.send(&wire::encode_sample(&sample));
            if delivery.queued > 0 {
                PortMetrics::incr(&self.metrics.samples_sent);
            }
            if delivery.dropped > 0 {
                self.metrics.record_drop(DropReason::Backpressure);
            }
        }
        PortMetrics::incr(&self.metrics.flushes);
        trace!(port = self.config.port_number, batch, "Flushed samples");
        self.state = VarsPortState::Sampling;
    }

    /// Flush what is buffered, best effort, and release the socket.
    pub fn close(&mut self) {
        if self.state == VarsPortState::Closed {
            return;
        }
        if !self.buffer.is_empty() {
            self.flush();
        }
        self.transport.close();
        self.state = VarsPortState::Closed;
        info!(port = self.config.port_number, "Output vars port closed");
    }

    #[must_use]
    pub fn state(&self) -> VarsPortState {
        self.state
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
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

impl Drop for OutputVarsPort {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::ArenaStore;
    use crate::adapters::transport::{MemoryHub, MemorySubscriber};

    fn port(sample: f64, flush: f64, hub: &MemoryHub) -> OutputVarsPort {
        let config = PortConfig::builder(5557)
            .sample_period(sample)
            .flush_period(flush)
            .build()
            .unwrap();
        OutputVarsPort::with_transport(config, Box::new(hub.publisher())).unwrap()
    }

    fn drain(sub: &mut MemorySubscriber) -> Vec<Sample> {
        std::iter::from_fn(|| sub.try_receive())
            .map(|frame| wire::decode_sample(&frame).unwrap())
            .collect()
    }

    #[test]
    fn test_one_flush_of_five_samples() {
        let hub = MemoryHub::new("vars", 1024);
        let mut sub = hub.subscriber();
        let mut store = ArenaStore::new();
        let v = store.push(-65.0);

        let mut port = port(1.0, 5.0, &hub);
        port.add_ref_to_group(1, v, None).unwrap();
        port.start(0.0);

        let dt = 0.025;
        let mut t = 0.0;
        for _ in 0..200 {
            t += dt;
            port.on_step(t, &store);
        }

        let samples = drain(&mut sub);
        assert_eq!(samples.len(), 5);
        assert_eq!(port.metrics().snapshot().flushes, 1);
        assert!(samples.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(samples.iter().all(|s| s.group_id == 1 && s.value == -65.0));
        assert_eq!(port.buffered(), 0);
    }

    #[test]
    fn test_weight_scales_samples() {
        let hub = MemoryHub::new("weight", 16);
        let mut sub = hub.subscriber();
        let mut store = ArenaStore::new();
        let v = store.push(0.5);

        let mut port = port(1.0, 1.0, &hub);
        port.add_ref_to_group(1, v, Some(888.0)).unwrap();
        port.start(0.0);
        port.on_step(1.0, &store);

        let samples = drain(&mut sub);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, 444.0);
        assert_eq!(samples[0].timestamp, 1.0);
    }

    #[test]
    fn test_flush_shorter_than_sample_collapses() {
        let hub = MemoryHub::new("collapse", 16);
        let mut sub = hub.subscriber();
        let mut store = ArenaStore::new();
        let v = store.push(1.0);

        let mut port = port(1.0, 0.1, &hub);
        port.add_ref_to_group(7, v, None).unwrap();
        port.start(0.0);
        for k in 1..=3 {
            port.on_step(f64::from(k), &store);
            assert_eq!(drain(&mut sub).len(), 1);
        }
        assert_eq!(port.metrics().snapshot().flushes, 3);
    }

    #[test]
    fn test_skipped_boundaries_sample_once() {
        let hub = MemoryHub::new("skip", 16);
        let mut sub = hub.subscriber();
        let mut store = ArenaStore::new();
        let v = store.push(1.0);

        let mut port = port(1.0, 1.0, &hub);
        port.add_ref_to_group(1, v, None).unwrap();
        port.start(0.0);
        port.on_step(3.5, &store);
        assert_eq!(drain(&mut sub).len(), 1);

        port.on_step(3.9, &store);
        assert!(drain(&mut sub).is_empty());
        port.on_step(4.0, &store);
        assert_eq!(drain(&mut sub).len(), 1);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let hub = MemoryHub::new("overflow", 16);
        let mut sub = hub.subscriber();
        let mut store = ArenaStore::new();
        let v = store.push(0.0);

        let config = PortConfig::builder(5557)
            .sample_period(1.0)
            .flush_period(10.0)
            .max_buffered_samples(3)
            .build()
            .unwrap();
        let mut port = OutputVarsPort::with_transport(config, Box::new(hub.publisher())).unwrap();
        port.add_ref_to_group(1, v, None).unwrap();
        port.start(0.0);

        for k in 1..=10 {
            store.write(v, f64::from(k));
            port.on_step(f64::from(k), &store);
        }

        let values: Vec<f64> = drain(&mut sub).iter().map(|s| s.value).collect();
        assert_eq!(values, vec![8.0, 9.0, 10.0]);
        assert_eq!(port.metrics().snapshot().overflow_drops, 7);
    }

    #[test]
    fn test_stale_handle_is_skipped() {
        let hub = MemoryHub::new("stale", 16);
        let mut sub = hub.subscriber();
        let mut store = ArenaStore::new();
        let live = store.push(2.0);
        let gone = store.push(3.0);
        store.truncate(1);

        let mut port = port(1.0, 1.0, &hub);
        port.add_ref_to_group(1, live, None).unwrap();
        port.add_ref_to_group(1, gone, None).unwrap();
        port.start(0.0);
        port.on_step(1.0, &store);

        assert_eq!(drain(&mut sub).len(), 1);
        assert_eq!(port.metrics().snapshot().stale_refs, 1);
    }

    #[test]
    fn test_binding_after_start_is_rejected() {
        let hub = MemoryHub::new("late", 16);
        let mut port = port(1.0, 1.0, &hub);
        port.start(0.0);
        let err = port
            .add_ref_to_group(2, VarHandle::new(0), None)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::LateBinding { group: 2 }));
    }

    #[test]
    fn test_close_flushes_buffer() {
        let hub = MemoryHub::new("close", 16);
        let mut sub = hub.subscriber();
        let mut store = ArenaStore::new();
        let v = store.push(1.0);

        let mut port = port(1.0, 100.0, &hub);
        port.add_ref_to_group(1, v, None).unwrap();
        port.on_step(0.0, &store);
        port.on_step(1.0, &store);
        port.on_step(2.0, &store);
        assert_eq!(port.buffered(), 2);

        port.close();
        assert_eq!(port.state(), VarsPortState::Closed);
        assert_eq!(drain(&mut sub).len(), 2);

        port.on_step(3.0, &store);
        assert_eq!(port.metrics().snapshot().samples_taken, 2);
    }
}
