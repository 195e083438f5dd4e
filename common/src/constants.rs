//! Shared constants for the schedlat probe
//!
//! Used by both the decoder and the loader so that the userspace side
//! agrees with the kernel object on names, tags and offsets.

// ============================================================================
// Event Types (for RawEvent.event_type)
// ============================================================================

/// Completed `tcp_sendmsg` call (kprobe + kretprobe pair)
pub const EVENT_TYPE_TCP_SEND: u8 = 1;

/// Scheduler context switch (raw tracepoint)
pub const EVENT_TYPE_SCHED_SWITCH: u8 = 2;

// ============================================================================
// Record Layout
// ============================================================================

/// Size of one ring buffer record in bytes
pub const RECORD_SIZE: usize = 48;

pub const OFFSET_TYPE: usize = 0;
pub const OFFSET_PID: usize = 4;
pub const OFFSET_CPU: usize = 8;
pub const OFFSET_TIMESTAMP: usize = 16;
pub const OFFSET_DURATION: usize = 24;
pub const OFFSET_PACKET_SIZE: usize = 32;
pub const OFFSET_NEXT_PID: usize = 40;

// ============================================================================
// Probe Object Names
// ============================================================================

/// Kprobe program on `tcp_sendmsg` entry
pub const PROG_TCP_SENDMSG_ENTRY: &str = "kprobe_tcp_sendmsg";

/// Kretprobe program on `tcp_sendmsg` return
pub const PROG_TCP_SENDMSG_RETURN: &str = "kretprobe_tcp_sendmsg";

/// Raw tracepoint program on `sched_switch`
pub const PROG_SCHED_SWITCH: &str = "raw_tp_sched_switch";

/// Kernel function traced for send latency
pub const TCP_SENDMSG_SYMBOL: &str = "tcp_sendmsg";

/// Raw tracepoint name for context switches
pub const SCHED_SWITCH_TRACEPOINT: &str = "sched_switch";

/// Ring buffer map carrying records to userspace
pub const EVENTS_MAP: &str = "events";

/// Read-only global holding the PID to scope TCP tracing to
pub const TARGET_PID_GLOBAL: &str = "target_pid";

// ============================================================================
// Evaluation Defaults
// ============================================================================

/// Peak send latency above which a tick dumps evidence (80 microseconds)
pub const DEFAULT_THRESHOLD_NS: u64 = 80_000;

/// Evaluator period in milliseconds
pub const DEFAULT_EVAL_INTERVAL_MS: u64 = 1_000;

/// How far behind the newest TCP event the store keeps history (2 seconds)
pub const DEFAULT_RETENTION_NS: u64 = 2_000_000_000;

/// Pruner period in milliseconds
pub const DEFAULT_PRUNE_INTERVAL_MS: u64 = 1_000;

/// Name reported when a PID cannot be resolved
pub const UNKNOWN_PROCESS_NAME: &str = "unknown";

// ============================================================================
// Export Artifacts
// ============================================================================

pub const TCP_CSV_FILE: &str = "tcp_anomaly.csv";
pub const SCHED_CSV_FILE: &str = "sched_anomaly.csv";
pub const ANOMALY_DIR: &str = "anomalies";

pub const TCP_CSV_HEADER: &str = "timestamp_ns,duration_ns,size_bytes";
pub const SCHED_CSV_HEADER: &str = "timestamp_ns,cpu,prev_pid,next_pid,prev_comm,next_comm";
