//! # Outbound Ports (Driven Ports)
//!
//! What the bridge needs from its surroundings: a message transport, the
//! simulation's variable storage, and a clock.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::domain::VarHandle;
use crate::stop::StopSignal;

/// Which side of a pub/sub link a transport plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransportRole {
    /// Binds a local endpoint and fans messages out to every subscriber.
    Publisher,
    /// Connects to a remote publisher and receives its messages.
    Subscriber,
}

/// Result of handing one message to a transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Peers that accepted (or queued) the message.
    pub queued: usize,
    /// Peers for which the message was dropped because their queue was full.
    pub dropped: usize,
}

impl Delivery {
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.dropped > 0 && self.queued == 0
    }
}

/// Counters kept by every transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    /// Per-peer drops caused by a full outbound queue.
    pub dropped_count: u64,
    /// Messages sent while no peer was attached.
    pub unrouted_count: u64,
    pub peers: usize,
}

/// Message-oriented pub/sub socket.
///
/// Frame boundaries are preserved: one `send` on one side is one
/// `try_receive` result on the other.
pub trait Transport: Send {
    fn role(&self) -> TransportRole;

    /// Local or remote endpoint, for logging.
    fn endpoint(&self) -> &str;

    /// Send one message.
    ///
    /// Publishers fan out to every attached subscriber; subscribers send
    /// upstream to their publisher. In blocking mode this call may suspend
    /// the caller until the peer accepts the data. In non-blocking mode a
    /// full queue drops the message for that peer.
    fn send(&mut self, payload: &[u8]) -> Delivery;

    /// Next pending message, if any. Never blocks.
    fn try_receive(&mut self) -> Option<Vec<u8>>;

    fn stats(&self) -> TransportStats;

    /// Release the socket. Further sends are dropped silently.
    fn close(&mut self);
}

/// Storage for the scalars the simulation engine owns.
///
/// Handles are locators; a handle the store no longer knows reads as
/// `None` and ignores writes.
pub trait VariableStore {
    fn read(&self, handle: VarHandle) -> Option<f64>;

    /// Returns `false` when the handle does not resolve.
    fn write(&mut self, handle: VarHandle, value: f64) -> bool;
}

/// Wall-clock source used for real-time pacing.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Sleep for `duration`, returning early with `false` if `stop` is raised.
    fn sleep(&self, duration: Duration, stop: &StopSignal) -> bool;
}
