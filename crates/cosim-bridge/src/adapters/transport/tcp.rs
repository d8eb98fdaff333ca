//! TCP pub/sub transport.
//!
//! A [`TcpPublisher`] binds `host:port_number` and fans every message out
//! to all connected subscribers. A [`TcpSubscriber`] connects to a
//! publisher. Both directions use the length-prefixed framing in
//! [`super::framing`]; subscribers may send frames upstream, which is how
//! the ICP acknowledgment reaches an events port.
//!
//! # Blocking vs. non-blocking
//!
//! | Role | `blocking_socket = true` | `blocking_socket = false` |
//! |------|--------------------------|---------------------------|
//! | Publisher | `send` writes each frame completely, stalling the caller while a subscriber is slow | per-subscriber queue of [`HIGH_WATER_MARK`] frames; overflow drops |
//! | Subscriber | connect retries until `connect_timeout` | single connect attempt |
//!
//! Receiving never blocks in either mode.

use std::collections::VecDeque;
use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::framing::{encode_frame, read_available, FrameReader, Outbox, StreamState};
use crate::domain::PortConfig;
use crate::error::{BridgeError, Result};
use crate::ports::{Delivery, Transport, TransportRole, TransportStats};

/// Frames queued per subscriber before non-blocking sends start dropping.
pub const HIGH_WATER_MARK: usize = 1000;

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

fn setup_error(role: TransportRole, endpoint: &str, source: std::io::Error) -> BridgeError {
    BridgeError::TransportSetup {
        role,
        endpoint: endpoint.to_string(),
        source,
    }
}

struct Peer {
    stream: TcpStream,
    addr: SocketAddr,
    outbox: Outbox,
    reader: FrameReader,
    alive: bool,
}

impl Peer {
    fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        Self {
            stream,
            addr,
            outbox: Outbox::default(),
            reader: FrameReader::default(),
            alive: true,
        }
    }

    fn fail(&mut self, error: &std::io::Error) {
        if self.alive {
            info!(peer = %self.addr, %error, "Subscriber disconnected");
        }
        self.alive = false;
    }
}

pub struct TcpPublisher {
    listener: Option<TcpListener>,
    endpoint: String,
    blocking: bool,
    peers: Vec<Peer>,
    inbox: VecDeque<Vec<u8>>,
    stats: TransportStats,
}

impl TcpPublisher {
    /// Bind the publisher endpoint. Fails if the port is already in use.
    pub fn bind(config: &PortConfig) -> Result<Self> {
        let endpoint = config.endpoint();
        let role = TransportRole::Publisher;
        let listener =
            TcpListener::bind(&endpoint).map_err(|e| setup_error(role, &endpoint, e))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| setup_error(role, &endpoint, e))?;

        info!(%endpoint, blocking = config.blocking_socket, "Publisher bound");

        Ok(Self {
            listener: Some(listener),
            endpoint,
            blocking: config.blocking_socket,
            peers: Vec::new(),
            inbox: VecDeque::new(),
            stats: TransportStats::default(),
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Number of subscribers currently attached.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Accept every pending subscriber connection.
    pub fn accept_pending(&mut self) {
        let Some(listener) = &self.listener else {
            return;
        };
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = Self::configure_stream(&stream, self.blocking) {
                        warn!(peer = %addr, error = %e, "Failed to configure subscriber socket");
                        continue;
                    }
                    info!(endpoint = %self.endpoint, peer = %addr, "Subscriber connected");
                    self.peers.push(Peer::new(stream, addr));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(endpoint = %self.endpoint, error = %e, "Accept failed");
                    break;
                }
            }
        }
        self.stats.peers = self.peers.len();
    }

    fn configure_stream(stream: &TcpStream, blocking: bool) -> std::io::Result<()> {
        stream.set_nodelay(true)?;
        stream.set_nonblocking(!blocking)
    }

    fn prune(&mut self) {
        self.peers.retain(|p| p.alive);
        self.stats.peers = self.peers.len();
    }

    fn send_blocking(peer: &mut Peer, frame: &[u8]) -> bool {
        match peer.stream.write_all(frame) {
            Ok(()) => true,
            Err(e) => {
                peer.fail(&e);
                false
            }
        }
    }

    fn send_queued(peer: &mut Peer, frame: &[u8]) -> Option<bool> {
        if let Err(e) = peer.outbox.flush(&mut peer.stream) {
            peer.fail(&e);
            return None;
        }
        if peer.outbox.len() >= HIGH_WATER_MARK {
            return Some(false);
        }
        peer.outbox.push(frame.to_vec());
        if let Err(e) = peer.outbox.flush(&mut peer.stream) {
            peer.fail(&e);
            return None;
        }
        Some(true)
    }

    /// Pull upstream frames from every subscriber into the inbox.
    fn drain_upstream(&mut self) {
        for peer in &mut self.peers {
            if self.blocking {
                if let Err(e) = peer.stream.set_nonblocking(true) {
                    peer.fail(&e);
                    continue;
                }
            }
            match read_available(&mut peer.stream, &mut peer.reader) {
                Ok(StreamState::Open) => {}
                Ok(StreamState::Closed) => {
                    peer.fail(&std::io::Error::new(ErrorKind::UnexpectedEof, "closed by peer"));
                }
                Err(e) => peer.fail(&e),
            }
            loop {
                match peer.reader.next_frame() {
                    Ok(Some(frame)) => self.inbox.push_back(frame),
                    Ok(None) => break,
                    Err(e) => {
                        peer.fail(&e);
                        break;
                    }
                }
            }
            if self.blocking && peer.alive {
                if let Err(e) = peer.stream.set_nonblocking(false) {
                    peer.fail(&e);
                }
            }
        }
        self.prune();
    }
}

impl Transport for TcpPublisher {
    fn role(&self) -> TransportRole {
        TransportRole::Publisher
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn send(&mut self, payload: &[u8]) -> Delivery {
        if self.listener.is_none() {
            return Delivery::default();
        }
        self.accept_pending();

        if self.peers.is_empty() {
            self.stats.unrouted_count += 1;
            return Delivery::default();
        }

        let frame = encode_frame(payload);
        let mut delivery = Delivery::default();
        for peer in &mut self.peers {
            if self.blocking {
                if Self::send_blocking(peer, &frame) {
                    delivery.queued += 1;
                }
            } else {
                match Self::send_queued(peer, &frame) {
                    Some(true) => delivery.queued += 1,
                    Some(false) => delivery.dropped += 1,
                    None => {}
                }
            }
        }
        self.prune();

        if delivery.queued > 0 {
            self.stats.messages_sent += 1;
        } else if delivery.dropped == 0 {
            self.stats.unrouted_count += 1;
        }
        self.stats.dropped_count += delivery.dropped as u64;
        if delivery.dropped > 0 {
            debug!(endpoint = %self.endpoint, dropped = delivery.dropped, "Subscriber queue full");
        }
        delivery
    }

    fn try_receive(&mut self) -> Option<Vec<u8>> {
        if self.inbox.is_empty() && self.listener.is_some() {
            self.accept_pending();
            self.drain_upstream();
        }
        let frame = self.inbox.pop_front()?;
        self.stats.messages_received += 1;
        Some(frame)
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }

    fn close(&mut self) {
        if self.listener.take().is_none() {
            return;
        }
        for peer in &mut self.peers {
            if !self.blocking {
                // Best effort: hand queued frames to the kernel before closing.
                if let Err(e) = peer.outbox.flush(&mut peer.stream) {
                    debug!(peer = %peer.addr, error = %e, "Discarding queued frames on close");
                }
            }
            let _ = peer.stream.shutdown(std::net::Shutdown::Both);
        }
        self.peers.clear();
        self.stats.peers = 0;
        info!(endpoint = %self.endpoint, "Publisher closed");
    }
}

impl Drop for TcpPublisher {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct TcpSubscriber {
    stream: Option<TcpStream>,
    endpoint: String,
    reader: FrameReader,
    outbox: Outbox,
    inbox: VecDeque<Vec<u8>>,
    stats: TransportStats,
}

impl TcpSubscriber {
    /// Connect to the publisher at `config.endpoint()`.
    ///
    /// With `blocking_socket` the connect is retried until
    /// `connect_timeout` elapses, so the publisher may start later.
    pub fn connect(config: &PortConfig) -> Result<Self> {
        let endpoint = config.endpoint();
        let role = TransportRole::Subscriber;
        let deadline = Instant::now() + config.connect_timeout;

        let stream = loop {
            match TcpStream::connect(&endpoint) {
                Ok(stream) => break stream,
                Err(e) if config.blocking_socket && Instant::now() < deadline => {
                    debug!(%endpoint, error = %e, "Publisher not reachable yet, retrying");
                    std::thread::sleep(CONNECT_RETRY_INTERVAL);
                }
                Err(e) => return Err(setup_error(role, &endpoint, e)),
            }
        };
        stream
            .set_nonblocking(true)
            .and_then(|()| stream.set_nodelay(true))
            .map_err(|e| setup_error(role, &endpoint, e))?;

        info!(%endpoint, "Subscriber connected");

        Ok(Self {
            stream: Some(stream),
            endpoint,
            reader: FrameReader::default(),
            outbox: Outbox::default(),
            inbox: VecDeque::new(),
            stats: TransportStats {
                peers: 1,
                ..TransportStats::default()
            },
        })
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn disconnect(&mut self, reason: &str) {
        if self.stream.take().is_some() {
            warn!(endpoint = %self.endpoint, reason, "Publisher connection lost");
        }
        self.stats.peers = 0;
    }

    fn fill_inbox(&mut self) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        let state = read_available(stream, &mut self.reader);
        loop {
            match self.reader.next_frame() {
                Ok(Some(frame)) => self.inbox.push_back(frame),
                Ok(None) => break,
                Err(e) => {
                    self.disconnect(&e.to_string());
                    return;
                }
            }
        }
        match state {
            Ok(StreamState::Open) => {}
            Ok(StreamState::Closed) => self.disconnect("closed by publisher"),
            Err(e) => self.disconnect(&e.to_string()),
        }
    }
}

impl Transport for TcpSubscriber {
    fn role(&self) -> TransportRole {
        TransportRole::Subscriber
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn send(&mut self, payload: &[u8]) -> Delivery {
        let Some(stream) = self.stream.as_mut() else {
            return Delivery::default();
        };
        if self.outbox.len() >= HIGH_WATER_MARK {
            self.stats.dropped_count += 1;
            return Delivery {
                queued: 0,
                dropped: 1,
            };
        }
        self.outbox.push(encode_frame(payload));
        if let Err(e) = self.outbox.flush(stream) {
            self.disconnect(&e.to_string());
            return Delivery::default();
        }
        self.stats.messages_sent += 1;
        Delivery {
            queued: 1,
            dropped: 0,
        }
    }

    fn try_receive(&mut self) -> Option<Vec<u8>> {
        if self.inbox.is_empty() {
            self.fill_inbox();
        }
        let frame = self.inbox.pop_front()?;
        self.stats.messages_received += 1;
        Some(frame)
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }

    fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = self.outbox.flush(&mut stream) {
                debug!(endpoint = %self.endpoint, error = %e, "Discarding upstream frames on close");
            }
            let _ = stream.shutdown(std::net::Shutdown::Both);
            info!(endpoint = %self.endpoint, "Subscriber closed");
        }
        self.stats.peers = 0;
    }
}

impl Drop for TcpSubscriber {
    fn drop(&mut self) {
        self.close();
    }
}
