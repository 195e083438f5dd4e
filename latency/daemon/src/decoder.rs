//! Record decoding for raw ring buffer samples
//!
//! Reads the fixed little-endian layout field by field at known offsets.
//! The buffer length is checked once up front; nothing is reinterpreted
//! in place.

use crate::types::{kernel::constants::*, Event, RawEvent};
use thiserror::Error;

/// Errors that can occur while decoding a record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record too short: {size} bytes")]
    Truncated { size: usize },

    #[error("unknown event type: {raw}")]
    UnknownEventType { raw: u8 },
}

/// Decode one ring buffer sample into an [`Event`]
///
/// Trailing bytes beyond the fixed layout are ignored.
pub fn decode(data: &[u8]) -> Result<Event, DecodeError> {
    let raw = read_raw(data)?;

    match raw.event_type {
        EVENT_TYPE_TCP_SEND => Ok(Event::TcpSend {
            timestamp_ns: raw.timestamp_ns,
            duration_ns: raw.duration_ns,
            size_bytes: raw.packet_size,
        }),
        EVENT_TYPE_SCHED_SWITCH => Ok(Event::SchedSwitch {
            timestamp_ns: raw.timestamp_ns,
            cpu: raw.cpu,
            prev_pid: raw.pid,
            next_pid: raw.next_pid,
        }),
        other => Err(DecodeError::UnknownEventType { raw: other }),
    }
}

/// Read every field of the wire record
pub fn read_raw(data: &[u8]) -> Result<RawEvent, DecodeError> {
    let Some(data) = data.get(..RECORD_SIZE) else {
        return Err(DecodeError::Truncated { size: data.len() });
    };

    Ok(RawEvent {
        event_type: data[OFFSET_TYPE],
        pid: read_u32_le(data, OFFSET_PID),
        cpu: read_u32_le(data, OFFSET_CPU),
        timestamp_ns: read_u64_le(data, OFFSET_TIMESTAMP),
        duration_ns: read_u64_le(data, OFFSET_DURATION),
        packet_size: read_u64_le(data, OFFSET_PACKET_SIZE),
        next_pid: read_u32_le(data, OFFSET_NEXT_PID),
        ..RawEvent::default()
    })
}

// Callers hold a slice of exactly RECORD_SIZE bytes, so these never go out
// of bounds.

#[inline(always)]
fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

#[inline(always)]
fn read_u64_le(data: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp_record(ts: u64, duration: u64, size: u64) -> RawEvent {
        RawEvent {
            event_type: EVENT_TYPE_TCP_SEND,
            pid: 4242,
            cpu: 3,
            timestamp_ns: ts,
            duration_ns: duration,
            packet_size: size,
            ..RawEvent::default()
        }
    }

    #[test]
    fn test_decode_tcp_send() {
        let bytes = tcp_record(1_000, 250, 1_448).to_bytes();

        assert_eq!(
            decode(&bytes),
            Ok(Event::TcpSend {
                timestamp_ns: 1_000,
                duration_ns: 250,
                size_bytes: 1_448,
            })
        );
    }

    #[test]
    fn test_decode_sched_switch() {
        let raw = RawEvent {
            event_type: EVENT_TYPE_SCHED_SWITCH,
            pid: 10,
            cpu: 7,
            timestamp_ns: 99,
            next_pid: 20,
            // Ignored for switches
            duration_ns: 5,
            packet_size: 6,
            ..RawEvent::default()
        };

        assert_eq!(
            decode(&raw.to_bytes()),
            Ok(Event::SchedSwitch {
                timestamp_ns: 99,
                cpu: 7,
                prev_pid: 10,
                next_pid: 20,
            })
        );
    }

    #[test]
    fn test_decode_reads_little_endian_offsets() {
        let mut bytes = [0u8; RECORD_SIZE];
        bytes[0] = EVENT_TYPE_TCP_SEND;
        bytes[16] = 0x01;
        bytes[17] = 0x02;
        bytes[24] = 0xff;
        bytes[32] = 0x10;

        assert_eq!(
            decode(&bytes),
            Ok(Event::TcpSend {
                timestamp_ns: 0x0201,
                duration_ns: 0xff,
                size_bytes: 0x10,
            })
        );
    }

    #[test]
    fn test_decode_short_buffer() {
        let bytes = tcp_record(1, 1, 1).to_bytes();

        assert_eq!(
            decode(&bytes[..RECORD_SIZE - 1]),
            Err(DecodeError::Truncated {
                size: RECORD_SIZE - 1
            })
        );
        assert_eq!(decode(&[]), Err(DecodeError::Truncated { size: 0 }));
    }

    #[test]
    fn test_decode_unknown_type() {
        let mut raw = tcp_record(1, 1, 1);
        raw.event_type = 9;

        assert_eq!(
            decode(&raw.to_bytes()),
            Err(DecodeError::UnknownEventType { raw: 9 })
        );

        raw.event_type = 0;
        assert!(decode(&raw.to_bytes()).is_err());
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut bytes = tcp_record(5, 6, 7).to_bytes().to_vec();
        bytes.extend_from_slice(&[0xaa; 16]);

        assert_eq!(decode(&bytes).map(|e| e.timestamp_ns()), Ok(5));
    }
}
