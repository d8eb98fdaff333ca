//! `cosim send`: the external side of an input port.

use std::time::Duration;

use anyhow::Result;
use cosim_bridge::adapters::transport::TcpPublisher;
use cosim_bridge::domain::wire;
use cosim_bridge::{ControlMessage, PortConfig, StopSignal, Transport};
use tracing::{info, warn};

use crate::cli::SendArgs;
use crate::commands::install_interrupt;

pub fn execute(args: &SendArgs) -> Result<()> {
    let config = PortConfig::builder(args.port).host(args.host.clone()).build()?;
    let mut publisher = TcpPublisher::bind(&config)?;
    info!(endpoint = publisher.endpoint(), group = args.group, value = args.value, "Publishing control messages");

    let stop = StopSignal::new();
    install_interrupt(&stop)?;

    let sent = publish(&mut publisher, args, &stop);
    let stats = publisher.stats();
    publisher.close();
    info!(sent, unrouted = stats.unrouted_count, dropped = stats.dropped_count, "Sender finished");
    Ok(())
}

/// Payload for one control message.
pub fn payload(args: &SendArgs) -> Vec<u8> {
    if args.int_pair {
        let group = i32::try_from(args.group).unwrap_or(i32::MAX);
        // Truncates toward zero, like the integer senders this form exists for.
        wire::encode_legacy_control(group, args.value as i32).to_vec()
    } else {
        wire::encode_control(&ControlMessage::new(args.group, args.value)).to_vec()
    }
}

/// Send until `count` is reached or `stop` is raised. Returns messages sent.
pub fn publish(transport: &mut dyn Transport, args: &SendArgs, stop: &StopSignal) -> u64 {
    if args.int_pair && args.value.fract() != 0.0 {
        warn!(value = args.value, "Integer-pair form drops the fractional part");
    }
    let payload = payload(args);
    let interval = Duration::from_millis(args.interval_ms);

    let mut sent = 0;
    while args.count.map_or(true, |count| sent < count) && !stop.is_stopped() {
        transport.send(&payload);
        sent += 1;
        if stop.wait_timeout(interval) {
            break;
        }
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosim_bridge::adapters::transport::MemoryHub;

    fn args(count: Option<u64>, int_pair: bool) -> SendArgs {
        SendArgs {
            port: 5559,
            host: "127.0.0.1".into(),
            group: 4,
            value: -3.5,
            interval_ms: 0,
            count,
            int_pair,
        }
    }

    #[test]
    fn test_sends_count_messages() {
        let hub = MemoryHub::new("send", 16);
        let mut sub = hub.subscriber();
        let mut publisher = hub.publisher();

        let sent = publish(&mut publisher, &args(Some(3), false), &StopSignal::new());
        assert_eq!(sent, 3);

        let frames: Vec<_> = std::iter::from_fn(|| sub.try_receive()).collect();
        assert_eq!(frames.len(), 3);
        let msg = wire::decode_control(&frames[0]).unwrap();
        assert_eq!(msg.group(), Some(4));
        assert_eq!(msg.value, -3.5);
    }

    #[test]
    fn test_int_pair_payload() {
        let bytes = payload(&args(None, true));
        assert_eq!(bytes.len(), wire::LEGACY_CONTROL_LEN);
        let msg = wire::decode_control(&bytes).unwrap();
        assert_eq!(msg.group(), Some(4));
        assert_eq!(msg.value, -3.0);
    }

    #[test]
    fn test_stop_ends_unbounded_send() {
        let hub = MemoryHub::new("send-stop", 16);
        let mut publisher = hub.publisher();
        let stop = StopSignal::new();
        stop.stop();

        assert_eq!(publish(&mut publisher, &args(None, false), &stop), 0);
    }
}
