//! # TCP Bridge Integration Tests
//!
//! Drive a `CoSimBridge` over real loopback sockets, with the external
//! side played by the crate's own TCP transports.

use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

use cosim_bridge::adapters::transport::{TcpPublisher, TcpSubscriber};
use cosim_bridge::adapters::ArenaStore;
use cosim_bridge::domain::wire;
use cosim_bridge::{
    BridgeError, CoSimApi, CoSimBridge, ControlMessage, PortConfig, RateConfig, Transport,
    TransportRole,
};

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn loopback(port: u16) -> PortConfig {
    PortConfig::builder(port).host("127.0.0.1").build().unwrap()
}

fn subscriber(port: u16) -> TcpSubscriber {
    let config = PortConfig::builder(port)
        .blocking_socket(true)
        .connect_timeout(Duration::from_secs(2))
        .build_for_subscriber()
        .unwrap();
    TcpSubscriber::connect(&config).unwrap()
}

fn receive_n(sub: &mut TcpSubscriber, n: usize) -> Vec<Vec<u8>> {
    let deadline = Instant::now() + Duration::from_secs(3);
    let mut frames = Vec::new();
    while frames.len() < n && Instant::now() < deadline {
        match sub.try_receive() {
            Some(frame) => frames.push(frame),
            None => thread::sleep(Duration::from_millis(2)),
        }
    }
    frames
}

/// Two refs on group 1; one control message (1, 42.0) sets both.
#[test]
fn test_control_message_sets_every_ref() {
    let port = free_port();
    let mut external = TcpPublisher::bind(&loopback(port)).unwrap();

    let mut bridge = CoSimBridge::new();
    let input = bridge
        .add_input(
            PortConfig::builder(port)
                .blocking_socket(true)
                .build_for_subscriber()
                .unwrap(),
        )
        .unwrap();

    let mut store = ArenaStore::new();
    let a = store.push(0.0);
    let b = store.push(0.0);
    bridge.bind_scalar(input, 1, a, None).unwrap();
    bridge.bind_scalar(input, 1, b, None).unwrap();
    bridge.begin(0.0);

    let delivery = external.send(&wire::encode_control(&ControlMessage::new(1, 42.0)));
    assert_eq!(delivery.queued, 1);

    let deadline = Instant::now() + Duration::from_secs(3);
    let mut t = 0.0;
    while store.get(a) != Some(42.0) && Instant::now() < deadline {
        t += 0.025;
        bridge.advance_step(t, 0.025, &mut store);
        thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(store.get(a), Some(42.0));
    assert_eq!(store.get(b), Some(42.0));
    let metrics = bridge.input(input).unwrap().metrics().snapshot();
    assert_eq!(metrics.writes_applied, 2);
}

/// A 3-byte message is counted and dropped without touching any variable.
#[test]
fn test_malformed_message_is_dropped() {
    let port = free_port();
    let mut external = TcpPublisher::bind(&loopback(port)).unwrap();

    let mut bridge = CoSimBridge::new();
    let input = bridge
        .add_input(
            PortConfig::builder(port)
                .blocking_socket(true)
                .build_for_subscriber()
                .unwrap(),
        )
        .unwrap();
    let mut store = ArenaStore::new();
    let a = store.push(7.0);
    bridge.bind_scalar(input, 1, a, None).unwrap();
    bridge.begin(0.0);

    external.send(&[1, 2, 3]);

    let deadline = Instant::now() + Duration::from_secs(3);
    let mut t = 0.0;
    while Instant::now() < deadline {
        t += 0.025;
        bridge.advance_step(t, 0.025, &mut store);
        if bridge.input(input).unwrap().metrics().snapshot().malformed == 1 {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(bridge.input(input).unwrap().metrics().snapshot().malformed, 1);
    assert_eq!(store.get(a), Some(7.0));
}

/// sample 1.0 / flush 5.0 with one ref: one batch of five samples after
/// five time units.
#[test]
fn test_output_vars_batch_over_tcp() {
    let port = free_port();
    let mut bridge = CoSimBridge::new();
    let vars = bridge
        .add_output_vars(
            PortConfig::builder(port)
                .host("127.0.0.1")
                .sample_period(1.0)
                .flush_period(5.0)
                .build()
                .unwrap(),
        )
        .unwrap();

    let mut store = ArenaStore::new();
    let v = store.push(-65.0);
    bridge.bind_scalar(vars, 1, v, Some(2.0)).unwrap();

    let mut sub = subscriber(port);
    bridge.begin(0.0);

    let dt = 0.025;
    let mut t = 0.0;
    for _ in 0..200 {
        t += dt;
        assert!(bridge.advance_step(t, dt, &mut store));
    }

    let samples: Vec<_> = receive_n(&mut sub, 5)
        .iter()
        .map(|frame| wire::decode_sample(frame).unwrap())
        .collect();
    assert_eq!(samples.len(), 5);
    assert!(samples.iter().all(|s| s.group_id == 1 && s.value == -130.0));
    assert!(samples.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

    let metrics = bridge.output_vars(vars).unwrap().metrics().snapshot();
    assert_eq!(metrics.flushes, 1);
    assert_eq!(metrics.samples_sent, 5);
}

/// Events are held back until the subscriber acknowledges.
#[test]
fn test_events_wait_for_icp_ack() {
    let port = free_port();
    let mut bridge = CoSimBridge::new();
    let events = bridge
        .add_output_events(
            PortConfig::builder(port)
                .host("127.0.0.1")
                .use_icp(true)
                .build()
                .unwrap(),
        )
        .unwrap();
    let mut store = ArenaStore::new();
    let spike = store.push(0.0);
    bridge.bind_scalar(events, 3, spike, None).unwrap();
    bridge.begin(0.0);

    bridge.on_event(events, 3).unwrap();
    assert_eq!(
        bridge.output_events(events).unwrap().metrics().snapshot().pre_ready_drops,
        1
    );

    let mut sub = subscriber(port);
    sub.send(&wire::encode_ack());

    let deadline = Instant::now() + Duration::from_secs(3);
    let mut t = 0.0;
    while !bridge.output_events(events).unwrap().is_ready() && Instant::now() < deadline {
        t += 0.025;
        bridge.advance_step(t, 0.025, &mut store);
        thread::sleep(Duration::from_millis(1));
    }
    assert!(bridge.output_events(events).unwrap().is_ready());

    bridge.on_source_event(events, spike).unwrap();
    let frames = receive_n(&mut sub, 1);
    assert_eq!(frames.len(), 1);
    let record = wire::decode_event(&frames[0]).unwrap();
    assert_eq!(record.group_id, 3);
    assert_eq!(record.sequence, 0);
}

/// Without subscribers a non-blocking publisher neither stalls nor fails.
#[test]
fn test_publisher_without_subscribers_does_not_stall() {
    let port = free_port();
    let mut publisher = TcpPublisher::bind(&loopback(port)).unwrap();

    let started = Instant::now();
    for _ in 0..100 {
        publisher.send(&[0u8; wire::SAMPLE_LEN]);
    }
    assert!(started.elapsed() < Duration::from_secs(1));

    let stats = publisher.stats();
    assert_eq!(stats.unrouted_count, 100);
    assert_eq!(stats.dropped_count, 0);
}

#[test]
fn test_port_in_use_fails_setup() {
    let port = free_port();
    let _holder = TcpPublisher::bind(&loopback(port)).unwrap();

    let mut bridge = CoSimBridge::new();
    let err = bridge.add_output_vars(loopback(port)).unwrap_err();
    assert!(matches!(
        err,
        BridgeError::TransportSetup {
            role: TransportRole::Publisher,
            ..
        }
    ));
}

#[test]
fn test_input_without_publisher_fails_setup() {
    let port = free_port();
    let mut bridge = CoSimBridge::new();
    let err = bridge
        .add_input(
            PortConfig::builder(port)
                .connect_timeout(Duration::from_millis(100))
                .build_for_subscriber()
                .unwrap(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::TransportSetup {
            role: TransportRole::Subscriber,
            ..
        }
    ));
}

/// rate = 10, dt = 0.025 ms: 1000 steps take at least 250 ms.
#[test]
fn test_rate_controller_holds_real_time() {
    let mut bridge = CoSimBridge::new().with_rate(RateConfig::new(10.0, 1e-3).unwrap());
    let mut store = ArenaStore::new();
    bridge.begin(0.0);

    let started = Instant::now();
    let mut t = 0.0;
    for _ in 0..1000 {
        t += 0.025;
        assert!(bridge.advance_step(t, 0.025, &mut store));
    }
    assert!(started.elapsed() >= Duration::from_millis(245));
}

/// A stop raised from another thread aborts a long sleep promptly.
#[test]
fn test_stop_aborts_pending_sleep() {
    let mut bridge = CoSimBridge::new().with_rate(RateConfig::new(10.0, 1.0).unwrap());
    let mut store = ArenaStore::new();
    bridge.begin(0.0);

    let stop = bridge.stop_handle();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        stop.stop();
    });

    let started = Instant::now();
    assert!(!bridge.advance_step(1.0, 1.0, &mut store));
    assert!(started.elapsed() < Duration::from_secs(5));
    stopper.join().unwrap();

    bridge.shutdown();
    assert!(bridge.report().stopped);
}
