//! Userspace type definitions
//!
//! Defines the decoded events, the records kept in the event store and the
//! per-tick statistics used by the evaluator.
//!
//! ## Organization
//!
//! - **Kernel Types**: the wire record shared with the probe (from schedlat_common)
//! - **Userspace Types**: decoded events, stored records and derived statistics

use serde::{Deserialize, Serialize};

// ============================================================================
// Kernel Types (from the probe object)
// ============================================================================

pub mod kernel {
    //! Types shared between the kernel probe and userspace
    //!
    //! These are re-exported from the schedlat-common crate and must
    //! maintain binary compatibility with the probe object.

    pub use schedlat_common::constants;
    pub use schedlat_common::types::RawEvent;
}

pub use kernel::RawEvent;

/// A decoded ring buffer record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A completed `tcp_sendmsg` call
    TcpSend {
        timestamp_ns: u64,
        duration_ns: u64,
        size_bytes: u64,
    },
    /// A context switch on `cpu` from `prev_pid` to `next_pid`
    SchedSwitch {
        timestamp_ns: u64,
        cpu: u32,
        prev_pid: u32,
        next_pid: u32,
    },
}

impl Event {
    pub fn timestamp_ns(&self) -> u64 {
        match self {
            Event::TcpSend { timestamp_ns, .. } | Event::SchedSwitch { timestamp_ns, .. } => {
                *timestamp_ns
            }
        }
    }
}

/// One observed send and its latency
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpRecord {
    /// Time the send returned (nanoseconds, kernel monotonic clock)
    pub timestamp_ns: u64,
    /// Time spent inside `tcp_sendmsg`
    pub duration_ns: u64,
    pub size_bytes: u64,
}

impl TcpRecord {
    /// The interval `[timestamp - duration, timestamp]` during which the send
    /// was in flight
    pub fn window(&self) -> (u64, u64) {
        (
            self.timestamp_ns.saturating_sub(self.duration_ns),
            self.timestamp_ns,
        )
    }
}

/// One context switch with both task names resolved at ingestion
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SchedRecord {
    pub timestamp_ns: u64,
    pub cpu: u32,
    pub prev_pid: u32,
    pub next_pid: u32,
    pub prev_name: String,
    pub next_name: String,
}

/// Latency statistics over one evaluator batch
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LatencyStats {
    /// Number of sends in the batch
    pub count: u64,
    /// Sum of all send durations
    pub total_ns: u64,
    /// `total_ns / count`, truncated
    pub avg_ns: u64,
    /// Slowest send in the batch
    pub max_ns: u64,
}

impl LatencyStats {
    /// Compute statistics for a batch
    ///
    /// Returns `None` for an empty batch.
    pub fn from_records(records: &[TcpRecord]) -> Option<Self> {
        if records.is_empty() {
            return None;
        }

        let (total_ns, max_ns) = records.iter().fold((0u64, 0u64), |(total, max), r| {
            (total.saturating_add(r.duration_ns), max.max(r.duration_ns))
        });
        let count = records.len() as u64;

        Some(Self {
            count,
            total_ns,
            avg_ns: total_ns / count,
            max_ns,
        })
    }
}

/// Number of events currently held by the store
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    pub tcp: usize,
    pub sched: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp(timestamp_ns: u64, duration_ns: u64) -> TcpRecord {
        TcpRecord {
            timestamp_ns,
            duration_ns,
            size_bytes: 64,
        }
    }

    #[test]
    fn test_stats_empty_batch() {
        assert_eq!(LatencyStats::from_records(&[]), None);
    }

    #[test]
    fn test_stats_average_truncates() {
        let stats = LatencyStats::from_records(&[tcp(1, 100), tcp(2, 101)]).unwrap();

        assert_eq!(stats.count, 2);
        assert_eq!(stats.total_ns, 201);
        assert_eq!(stats.avg_ns, 100);
        assert_eq!(stats.max_ns, 101);
    }

    #[test]
    fn test_window_saturates_at_zero() {
        assert_eq!(tcp(1_000, 200).window(), (800, 1_000));
        assert_eq!(tcp(100, 500).window(), (0, 100));
    }
}
