//! In-process pub/sub transport.
//!
//! Same delivery semantics as the TCP adapter (fan-out, bounded
//! per-subscriber queues, upstream frames) without sockets. Used by tests
//! and by embeddings that run the external side in the same process.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::ports::{Delivery, Transport, TransportRole, TransportStats};

#[derive(Debug)]
struct HubState {
    capacity: usize,
    /// One queue per subscriber; `None` once that subscriber closed.
    queues: Vec<Option<VecDeque<Vec<u8>>>>,
    upstream: VecDeque<Vec<u8>>,
    publisher_open: bool,
}

impl HubState {
    fn peers(&self) -> usize {
        self.queues.iter().filter(|q| q.is_some()).count()
    }
}

/// Shared endpoint that hands out one publisher and any number of subscribers.
#[derive(Debug, Clone)]
pub struct MemoryHub {
    name: String,
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    /// `capacity` bounds every subscriber queue and the upstream queue.
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(HubState {
                capacity,
                queues: Vec::new(),
                upstream: VecDeque::new(),
                publisher_open: true,
            })),
        }
    }

    #[must_use]
    pub fn publisher(&self) -> MemoryPublisher {
        MemoryPublisher {
            endpoint: format!("memory://{}", self.name),
            state: Arc::clone(&self.state),
            stats: TransportStats::default(),
            open: true,
        }
    }

    #[must_use]
    pub fn subscriber(&self) -> MemorySubscriber {
        let mut state = self.state.lock();
        state.queues.push(Some(VecDeque::new()));
        MemorySubscriber {
            endpoint: format!("memory://{}", self.name),
            state: Arc::clone(&self.state),
            slot: state.queues.len() - 1,
            stats: TransportStats {
                peers: 1,
                ..TransportStats::default()
            },
            open: true,
        }
    }
}

#[derive(Debug)]
pub struct MemoryPublisher {
    endpoint: String,
    state: Arc<Mutex<HubState>>,
    stats: TransportStats,
    open: bool,
}

impl Transport for MemoryPublisher {
    fn role(&self) -> TransportRole {
        TransportRole::Publisher
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn send(&mut self, payload: &[u8]) -> Delivery {
        if !self.open {
            return Delivery::default();
        }
        let mut state = self.state.lock();
        let capacity = state.capacity;
        let mut delivery = Delivery::default();
        for queue in state.queues.iter_mut().flatten() {
            if queue.len() >= capacity {
                delivery.dropped += 1;
            } else {
                queue.push_back(payload.to_vec());
                delivery.queued += 1;
            }
        }
        self.stats.peers = state.peers();

        if delivery.queued > 0 {
            self.stats.messages_sent += 1;
        } else if delivery.dropped == 0 {
            self.stats.unrouted_count += 1;
        }
        self.stats.dropped_count += delivery.dropped as u64;
        delivery
    }

    fn try_receive(&mut self) -> Option<Vec<u8>> {
        if !self.open {
            return None;
        }
        let frame = self.state.lock().upstream.pop_front()?;
        self.stats.messages_received += 1;
        Some(frame)
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.state.lock().publisher_open = false;
            self.stats.peers = 0;
        }
    }
}

#[derive(Debug)]
pub struct MemorySubscriber {
    endpoint: String,
    state: Arc<Mutex<HubState>>,
    slot: usize,
    stats: TransportStats,
    open: bool,
}

impl MemorySubscriber {
    /// `false` once the publisher side closed.
    #[must_use]
    pub fn publisher_open(&self) -> bool {
        self.state.lock().publisher_open
    }
}

impl Transport for MemorySubscriber {
    fn role(&self) -> TransportRole {
        TransportRole::Subscriber
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn send(&mut self, payload: &[u8]) -> Delivery {
        if !self.open {
            return Delivery::default();
        }
        let mut state = self.state.lock();
        if state.upstream.len() >= state.capacity {
            self.stats.dropped_count += 1;
            return Delivery {
                queued: 0,
                dropped: 1,
            };
        }
        state.upstream.push_back(payload.to_vec());
        self.stats.messages_sent += 1;
        Delivery {
            queued: 1,
            dropped: 0,
        }
    }

    fn try_receive(&mut self) -> Option<Vec<u8>> {
        if !self.open {
            return None;
        }
        let mut state = self.state.lock();
        let frame = state
            .queues
            .get_mut(self.slot)
            .and_then(Option::as_mut)
            .and_then(VecDeque::pop_front);
        match frame {
            Some(frame) => {
                self.stats.messages_received += 1;
                Some(frame)
            }
            None => {
                // Drained and the publisher is gone: same as a TCP EOF.
                if !state.publisher_open {
                    self.stats.peers = 0;
                }
                None
            }
        }
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            if let Some(queue) = self.state.lock().queues.get_mut(self.slot) {
                *queue = None;
            }
            self.stats.peers = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_to_every_subscriber() {
        let hub = MemoryHub::new("fanout", 16);
        let mut publisher = hub.publisher();
        let mut a = hub.subscriber();
        let mut b = hub.subscriber();

        let delivery = publisher.send(b"one");
        assert_eq!(delivery.queued, 2);

        assert_eq!(a.try_receive(), Some(b"one".to_vec()));
        assert_eq!(b.try_receive(), Some(b"one".to_vec()));
        assert_eq!(a.try_receive(), None);
    }

    #[test]
    fn test_full_queue_drops_for_that_subscriber_only() {
        let hub = MemoryHub::new("bounded", 2);
        let mut publisher = hub.publisher();
        let mut slow = hub.subscriber();
        let mut fast = hub.subscriber();

        for i in 0..3u8 {
            publisher.send(&[i]);
            if let Some(frame) = fast.try_receive() {
                assert_eq!(frame, vec![i]);
            }
        }

        assert_eq!(publisher.stats().dropped_count, 1);
        assert_eq!(slow.try_receive(), Some(vec![0]));
        assert_eq!(slow.try_receive(), Some(vec![1]));
        assert_eq!(slow.try_receive(), None);
    }

    #[test]
    fn test_no_subscribers_counts_unrouted() {
        let hub = MemoryHub::new("empty", 4);
        let mut publisher = hub.publisher();
        for _ in 0..100 {
            assert_eq!(publisher.send(&[0; 24]), Delivery::default());
        }
        assert_eq!(publisher.stats().unrouted_count, 100);
    }

    #[test]
    fn test_upstream_and_close() {
        let hub = MemoryHub::new("ack", 4);
        let mut publisher = hub.publisher();
        let mut sub = hub.subscriber();

        sub.send(b"ACK\0");
        assert_eq!(publisher.try_receive(), Some(b"ACK\0".to_vec()));

        sub.close();
        assert_eq!(publisher.send(b"x"), Delivery::default());
        assert_eq!(publisher.stats().unrouted_count, 1);

        publisher.close();
        assert!(!hub.subscriber().publisher_open());
    }

    #[test]
    fn test_subscriber_drains_before_seeing_close() {
        let hub = MemoryHub::new("drain", 4);
        let mut publisher = hub.publisher();
        let mut sub = hub.subscriber();

        publisher.send(b"last");
        publisher.close();
        assert_eq!(sub.stats().peers, 1);
        assert_eq!(sub.try_receive(), Some(b"last".to_vec()));
        assert_eq!(sub.try_receive(), None);
        assert_eq!(sub.stats().peers, 0);
    }
}
