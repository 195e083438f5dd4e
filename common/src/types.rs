//! Kernel record layout
//!
//! Mirrors `struct event_t` as emitted by the probe object. The daemon never
//! reinterprets ring buffer memory as this type; it is the reference the
//! offset constants are checked against.

use crate::constants::*;

/// One ring buffer record, as laid out by the kernel probe
///
/// Fields not meaningful for a given `event_type` are zero.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawEvent {
    /// See EVENT_TYPE_* constants
    pub event_type: u8,
    pub _pad0: [u8; 3],
    /// Sending PID for TCP events, previous task for switches
    pub pid: u32,
    pub cpu: u32,
    pub _pad1: [u8; 4],
    /// Kernel monotonic clock (nanoseconds)
    pub timestamp_ns: u64,
    /// Time spent inside `tcp_sendmsg` (nanoseconds)
    pub duration_ns: u64,
    pub packet_size: u64,
    /// Incoming task for switches
    pub next_pid: u32,
    pub _pad2: [u8; 4],
}

impl RawEvent {
    /// Encode into the little-endian wire format
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[OFFSET_TYPE] = self.event_type;
        buf[OFFSET_PID..OFFSET_PID + 4].copy_from_slice(&self.pid.to_le_bytes());
        buf[OFFSET_CPU..OFFSET_CPU + 4].copy_from_slice(&self.cpu.to_le_bytes());
        buf[OFFSET_TIMESTAMP..OFFSET_TIMESTAMP + 8].copy_from_slice(&self.timestamp_ns.to_le_bytes());
        buf[OFFSET_DURATION..OFFSET_DURATION + 8].copy_from_slice(&self.duration_ns.to_le_bytes());
        buf[OFFSET_PACKET_SIZE..OFFSET_PACKET_SIZE + 8]
            .copy_from_slice(&self.packet_size.to_le_bytes());
        buf[OFFSET_NEXT_PID..OFFSET_NEXT_PID + 4].copy_from_slice(&self.next_pid.to_le_bytes());
        buf
    }
}

// Compile-time layout checks
// These will fail to compile if the struct drifts from the wire offsets
const _: () = {
    assert!(core::mem::size_of::<RawEvent>() == RECORD_SIZE);
    assert!(core::mem::offset_of!(RawEvent, event_type) == OFFSET_TYPE);
    assert!(core::mem::offset_of!(RawEvent, pid) == OFFSET_PID);
    assert!(core::mem::offset_of!(RawEvent, cpu) == OFFSET_CPU);
    assert!(core::mem::offset_of!(RawEvent, timestamp_ns) == OFFSET_TIMESTAMP);
    assert!(core::mem::offset_of!(RawEvent, duration_ns) == OFFSET_DURATION);
    assert!(core::mem::offset_of!(RawEvent, packet_size) == OFFSET_PACKET_SIZE);
    assert!(core::mem::offset_of!(RawEvent, next_pid) == OFFSET_NEXT_PID);
};
