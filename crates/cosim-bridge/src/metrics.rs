//! Per-port counters
//!
//! Runtime anomalies never stop the simulation; they end up here instead.
//! Counters are atomics so they can be bumped through `&self`. Ports are
//! owned by the stepping thread and are not shared; hand a
//! [`MetricsSnapshot`] to whoever reports on them.
//!
//! ## Usage
//!
//! ```
//! use cosim_bridge::metrics::{DropReason, PortMetrics};
//!
//! let metrics = PortMetrics::new();
//! metrics.record_drop(DropReason::Malformed);
//! assert_eq!(metrics.snapshot().malformed, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Why a message or value was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Inbound frame could not be decoded.
    Malformed,
    /// Non-blocking send found the peer's queue full.
    Backpressure,
    /// Event raised before the ICP handshake completed.
    PreReady,
    /// Sample evicted from a full buffer.
    Overflow,
}

impl DropReason {
    fn label(self) -> &'static str {
        match self {
            Self::Malformed => "malformed message",
            Self::Backpressure => "send queue full",
            Self::PreReady => "port not acknowledged yet",
            Self::Overflow => "sample buffer full",
        }
    }
}

#[derive(Debug, Default)]
pub struct PortMetrics {
    /// Samples read from bound variables
    pub samples_taken: AtomicU64,
    /// Samples handed to the transport
    pub samples_sent: AtomicU64,
    /// Completed flushes of the sample buffer
    pub flushes: AtomicU64,
    pub events_sent: AtomicU64,
    pub messages_received: AtomicU64,
    /// Variable writes applied from inbound control messages
    pub writes_applied: AtomicU64,
    /// Handles that no longer resolved in the variable store
    pub stale_refs: AtomicU64,
    /// Inbound control messages naming a group nobody bound
    pub unknown_groups: AtomicU64,
    /// Events from sources bound to no group
    pub unbound_sources: AtomicU64,
    /// Polls that stopped at the per-step message cap
    pub step_cap_hits: AtomicU64,
    pub malformed: AtomicU64,
    pub backpressure_drops: AtomicU64,
    pub pre_ready_drops: AtomicU64,
    pub overflow_drops: AtomicU64,
}

impl PortMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    /// Count a dropped message. The first drop of each kind is logged at
    /// `warn`, the rest at `debug`.
    pub fn record_drop(&self, reason: DropReason) {
        let counter = match reason {
            DropReason::Malformed => &self.malformed,
            DropReason::Backpressure => &self.backpressure_drops,
            DropReason::PreReady => &self.pre_ready_drops,
            DropReason::Overflow => &self.overflow_drops,
        };
        let previous = counter.fetch_add(1, Ordering::Relaxed);
        if previous == 0 {
            tracing::warn!(reason = reason.label(), "Dropping message");
        } else {
            tracing::debug!(reason = reason.label(), total = previous + 1, "Dropping message");
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            samples_taken: load(&self.samples_taken),
            samples_sent: load(&self.samples_sent),
            flushes: load(&self.flushes),
            events_sent: load(&self.events_sent),
            messages_received: load(&self.messages_received),
            writes_applied: load(&self.writes_applied),
            stale_refs: load(&self.stale_refs),
            unknown_groups: load(&self.unknown_groups),
            unbound_sources: load(&self.unbound_sources),
            step_cap_hits: load(&self.step_cap_hits),
            malformed: load(&self.malformed),
            backpressure_drops: load(&self.backpressure_drops),
            pre_ready_drops: load(&self.pre_ready_drops),
            overflow_drops: load(&self.overflow_drops),
        }
    }
}

/// Point-in-time copy of [`PortMetrics`]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub samples_taken: u64,
    pub samples_sent: u64,
    pub flushes: u64,
    pub events_sent: u64,
    pub messages_received: u64,
    pub writes_applied: u64,
    pub stale_refs: u64,
    pub unknown_groups: u64,
    pub unbound_sources: u64,
    pub step_cap_hits: u64,
    pub malformed: u64,
    pub backpressure_drops: u64,
    pub pre_ready_drops: u64,
    pub overflow_drops: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let snapshot = PortMetrics::new().snapshot();
        assert_eq!(snapshot, MetricsSnapshot::default());
    }

    #[test]
    fn test_record_drop_routes_to_counter() {
        let metrics = PortMetrics::new();
        metrics.record_drop(DropReason::Malformed);
        metrics.record_drop(DropReason::Malformed);
        metrics.record_drop(DropReason::Backpressure);
        metrics.record_drop(DropReason::PreReady);
        metrics.record_drop(DropReason::Overflow);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.malformed, 2);
        assert_eq!(snapshot.backpressure_drops, 1);
        assert_eq!(snapshot.pre_ready_drops, 1);
        assert_eq!(snapshot.overflow_drops, 1);
    }

    #[test]
    fn test_snapshot_moves_to_reporting_thread() {
        let metrics = PortMetrics::new();
        PortMetrics::add(&metrics.writes_applied, 3);
        let snapshot = metrics.snapshot();

        let seen = std::thread::spawn(move || snapshot.writes_applied)
            .join()
            .unwrap();
        assert_eq!(seen, 3);
    }

    #[test]
    fn test_incr_and_add() {
        let metrics = PortMetrics::new();
        PortMetrics::incr(&metrics.flushes);
        PortMetrics::add(&metrics.samples_sent, 5);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.flushes, 1);
        assert_eq!(snapshot.samples_sent, 5);
    }
}
