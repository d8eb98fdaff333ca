//! `cosim listen`: the external side of an output port.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::Result;
use cosim_bridge::adapters::transport::TcpSubscriber;
use cosim_bridge::domain::wire;
use cosim_bridge::{PortConfig, StopSignal, Transport};
use serde_json::Value;
use tracing::{debug, info};

use crate::cli::{ListenArgs, StreamKind};
use crate::commands::install_interrupt;

const IDLE_WAIT: Duration = Duration::from_millis(5);

pub fn execute(args: &ListenArgs) -> Result<()> {
    let config = PortConfig::builder(args.port)
        .host(args.host.clone())
        .blocking_socket(true)
        .connect_timeout(Duration::from_millis(args.connect_timeout_ms))
        .build_for_subscriber()?;
    let mut subscriber = TcpSubscriber::connect(&config)?;
    info!(endpoint = subscriber.endpoint(), kind = ?args.kind, "Listening");

    if args.ack {
        subscriber.send(&wire::encode_ack());
        info!("Acknowledgment sent");
    }

    let stop = StopSignal::new();
    install_interrupt(&stop)?;

    let stdout = io::stdout();
    let received = listen(&mut subscriber, args.kind, args.count, &stop, &mut stdout.lock())?;
    subscriber.close();
    info!(received, "Listener finished");
    Ok(())
}

/// Decode one frame into a JSON value, or `None` if it is not a `kind` record.
pub fn decode(kind: StreamKind, frame: &[u8]) -> Option<Value> {
    let value = match kind {
        StreamKind::Samples => serde_json::to_value(wire::decode_sample(frame).ok()?),
        StreamKind::Events => serde_json::to_value(wire::decode_event(frame).ok()?),
    };
    value.ok()
}

/// Print one JSON line per record until `count`, `stop`, or the publisher
/// going away. Returns the number of records printed.
pub fn listen(
    transport: &mut dyn Transport,
    kind: StreamKind,
    count: Option<u64>,
    stop: &StopSignal,
    out: &mut dyn Write,
) -> Result<u64> {
    let mut received = 0;
    while count.map_or(true, |count| received < count) && !stop.is_stopped() {
        let Some(frame) = transport.try_receive() else {
            if transport.stats().peers == 0 {
                info!("Publisher closed the connection");
                break;
            }
            stop.wait_timeout(IDLE_WAIT);
            continue;
        };
        match decode(kind, &frame) {
            Some(record) => {
                writeln!(out, "{record}")?;
                received += 1;
            }
            None => debug!(len = frame.len(), "Skipping undecodable frame"),
        }
    }
    out.flush()?;
    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosim_bridge::adapters::transport::MemoryHub;
    use cosim_bridge::{EventRecord, Sample};

    #[test]
    fn test_prints_samples_as_json_lines() {
        let hub = MemoryHub::new("listen", 16);
        let mut sub = hub.subscriber();
        let mut publisher = hub.publisher();
        for i in 0..3 {
            let sample = Sample {
                group_id: 1,
                timestamp: f64::from(i),
                value: -65.0,
            };
            publisher.send(&wire::encode_sample(&sample));
        }
        publisher.send(&[0u8; 3]);

        let mut out = Vec::new();
        let n = listen(&mut sub, StreamKind::Samples, Some(3), &StopSignal::new(), &mut out).unwrap();
        assert_eq!(n, 3);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2]["timestamp"], 2.0);
        assert_eq!(lines[0]["value"], -65.0);
    }

    #[test]
    fn test_event_decode() {
        let frame = wire::encode_event(&EventRecord {
            group_id: 9,
            sequence: 41,
        });
        let value = decode(StreamKind::Events, &frame).unwrap();
        assert_eq!(value["group_id"], 9);
        assert_eq!(value["sequence"], 41);
        assert!(decode(StreamKind::Samples, &frame).is_none());
    }

    #[test]
    fn test_stops_when_publisher_closes() {
        let hub = MemoryHub::new("listen-close", 16);
        let mut sub = hub.subscriber();
        let mut publisher = hub.publisher();
        publisher.send(&wire::encode_event(&EventRecord {
            group_id: 1,
            sequence: 0,
        }));
        publisher.close();

        let mut out = Vec::new();
        let n = listen(&mut sub, StreamKind::Events, None, &StopSignal::new(), &mut out).unwrap();
        assert_eq!(n, 1);
    }
}
