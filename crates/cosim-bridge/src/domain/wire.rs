//! # Wire Codec
//!
//! Fixed-width binary messages, one message per transport frame. The
//! transport preserves frame boundaries, so no length or type field is
//! carried inside a message; the kind is implied by the port and the size.
//!
//! All fields are **little-endian**.
//!
//! ```text
//! Sample          (24 bytes)  ┌─────────────┬──────────────┬─────────────┐
//!                             │ f64 group   │ f64 timestamp│ f64 value   │
//!                             └─────────────┴──────────────┴─────────────┘
//! ControlMessage  (16 bytes)  ┌─────────────┬─────────────┐
//!                             │ f64 group   │ f64 value   │
//!                             └─────────────┴─────────────┘
//! Control, legacy ( 8 bytes)  ┌─────────────┬─────────────┐
//!                             │ i32 group   │ i32 value   │   (C `int[2]` senders)
//!                             └─────────────┴─────────────┘
//! EventRecord     ( 8 bytes)  ┌─────────────┬─────────────┐
//!                             │ u32 group   │ u32 sequence│
//!                             └─────────────┴─────────────┘
//! ICP ack         ( 4 bytes)  "ACK\0"
//! ```
//!
//! Group ids travel as doubles in samples and control messages; a decoded
//! group id must be an exact non-negative integer in `u32` range.

use crate::domain::entities::{group_from_f64, ControlMessage, EventRecord, Sample};
use crate::error::WireError;

pub const SAMPLE_LEN: usize = 24;
pub const CONTROL_LEN: usize = 16;
pub const LEGACY_CONTROL_LEN: usize = 8;
pub const EVENT_LEN: usize = 8;

/// Upstream acknowledgment frame completing the ICP handshake.
pub const ICP_ACK: &[u8; 4] = b"ACK\0";

fn f64_at(bytes: &[u8], offset: usize) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    f64::from_le_bytes(raw)
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

fn i32_at(bytes: &[u8], offset: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    i32::from_le_bytes(raw)
}

#[must_use]
pub fn encode_sample(sample: &Sample) -> [u8; SAMPLE_LEN] {
    let mut out = [0u8; SAMPLE_LEN];
    out[0..8].copy_from_slice(&f64::from(sample.group_id).to_le_bytes());
    out[8..16].copy_from_slice(&sample.timestamp.to_le_bytes());
    out[16..24].copy_from_slice(&sample.value.to_le_bytes());
    out
}

pub fn decode_sample(bytes: &[u8]) -> Result<Sample, WireError> {
    if bytes.len() != SAMPLE_LEN {
        return Err(WireError::length("sample", "24", bytes.len()));
    }
    let raw_group = f64_at(bytes, 0);
    let group_id = group_from_f64(raw_group).ok_or_else(|| WireError::group_id("sample", raw_group))?;
    Ok(Sample {
        group_id,
        timestamp: f64_at(bytes, 8),
        value: f64_at(bytes, 16),
    })
}

#[must_use]
pub fn encode_event(event: &EventRecord) -> [u8; EVENT_LEN] {
    let mut out = [0u8; EVENT_LEN];
    out[0..4].copy_from_slice(&event.group_id.to_le_bytes());
    out[4..8].copy_from_slice(&event.sequence.to_le_bytes());
    out
}

pub fn decode_event(bytes: &[u8]) -> Result<EventRecord, WireError> {
    if bytes.len() != EVENT_LEN {
        return Err(WireError::length("event", "8", bytes.len()));
    }
    Ok(EventRecord {
        group_id: u32_at(bytes, 0),
        sequence: u32_at(bytes, 4),
    })
}

#[must_use]
pub fn encode_control(msg: &ControlMessage) -> [u8; CONTROL_LEN] {
    let mut out = [0u8; CONTROL_LEN];
    out[0..8].copy_from_slice(&msg.group_id.to_le_bytes());
    out[8..16].copy_from_slice(&msg.value.to_le_bytes());
    out
}

/// Encode the legacy integer pair form of a control message.
#[must_use]
pub fn encode_legacy_control(group_id: i32, value: i32) -> [u8; LEGACY_CONTROL_LEN] {
    let mut out = [0u8; LEGACY_CONTROL_LEN];
    out[0..4].copy_from_slice(&group_id.to_le_bytes());
    out[4..8].copy_from_slice(&value.to_le_bytes());
    out
}

/// Decode a control message in either the double-pair or the legacy int-pair form.
///
/// The group id is validated so that a decoded message always names a
/// representable group.
pub fn decode_control(bytes: &[u8]) -> Result<ControlMessage, WireError> {
    let msg = match bytes.len() {
        CONTROL_LEN => ControlMessage {
            group_id: f64_at(bytes, 0),
            value: f64_at(bytes, 8),
        },
        LEGACY_CONTROL_LEN => ControlMessage {
            group_id: f64::from(i32_at(bytes, 0)),
            value: f64::from(i32_at(bytes, 4)),
        },
        other => return Err(WireError::length("control", "16 or 8", other)),
    };
    if msg.group().is_none() {
        return Err(WireError::group_id("control", msg.group_id));
    }
    Ok(msg)
}

#[must_use]
pub fn encode_ack() -> [u8; 4] {
    *ICP_ACK
}

#[must_use]
pub fn is_ack(bytes: &[u8]) -> bool {
    bytes == ICP_ACK
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sample_layout_is_little_endian() {
        let bytes = encode_sample(&Sample {
            group_id: 1,
            timestamp: 2.5,
            value: -65.0,
        });
        assert_eq!(&bytes[0..8], &1.0f64.to_le_bytes());
        assert_eq!(&bytes[8..16], &2.5f64.to_le_bytes());
        assert_eq!(&bytes[16..24], &(-65.0f64).to_le_bytes());
    }

    #[test]
    fn test_control_decodes_double_pair() {
        let bytes = encode_control(&ControlMessage::new(1, 42.0));
        let msg = decode_control(&bytes).unwrap();
        assert_eq!(msg.group(), Some(1));
        assert_eq!(msg.value, 42.0);
    }

    #[test]
    fn test_control_decodes_legacy_int_pair() {
        // What a ctypes `c_int * 2` array (1, 2) looks like on the wire.
        let bytes = [1u8, 0, 0, 0, 2, 0, 0, 0];
        let msg = decode_control(&bytes).unwrap();
        assert_eq!(msg.group(), Some(1));
        assert_eq!(msg.value, 2.0);
        assert_eq!(encode_legacy_control(1, 2), bytes);
    }

    #[test]
    fn test_control_rejects_bad_lengths() {
        for len in [0usize, 3, 9, 24] {
            let err = decode_control(&vec![0u8; len]).unwrap_err();
            assert!(matches!(err, WireError::MalformedMessage { kind: "control", .. }));
        }
    }

    #[test]
    fn test_control_rejects_fractional_group() {
        let bytes = encode_control(&ControlMessage {
            group_id: 1.5,
            value: 0.0,
        });
        assert!(decode_control(&bytes).is_err());
    }

    #[test]
    fn test_control_rejects_negative_legacy_group() {
        let bytes = encode_legacy_control(-1, 5);
        assert!(decode_control(&bytes).is_err());
    }

    #[test]
    fn test_event_layout() {
        let bytes = encode_event(&EventRecord {
            group_id: 3,
            sequence: 258,
        });
        assert_eq!(bytes, [3, 0, 0, 0, 2, 1, 0, 0]);
        assert_eq!(
            decode_event(&bytes).unwrap(),
            EventRecord {
                group_id: 3,
                sequence: 258
            }
        );
    }

    #[test]
    fn test_sample_rejects_wrong_length() {
        assert!(decode_sample(&[0u8; 16]).is_err());
    }

    #[test]
    fn test_ack_is_distinct_from_messages() {
        assert!(is_ack(&encode_ack()));
        assert!(!is_ack(&[0u8; EVENT_LEN]));
        assert!(decode_control(ICP_ACK).is_err());
    }

    proptest! {
        #[test]
        fn prop_sample_round_trip_is_exact(
            group_id in any::<u32>(),
            timestamp in any::<f64>().prop_filter("not nan", |v| !v.is_nan()),
            value in any::<f64>().prop_filter("not nan", |v| !v.is_nan()),
        ) {
            let sample = Sample { group_id, timestamp, value };
            let decoded = decode_sample(&encode_sample(&sample)).unwrap();
            prop_assert_eq!(decoded, sample);
            prop_assert_eq!(decoded.value.to_bits(), value.to_bits());
        }
    }
}
