//! Windowed join of scheduling events against TCP send windows
//!
//! A scheduling event is kept when its timestamp lies inside
//! `[send_ts - duration, send_ts]` of at least one send. Both ends are
//! inclusive. Overlapping windows never emit the same event twice.

use crate::types::{SchedRecord, TcpRecord};

/// Return the scheduling events that happened while any send was in flight
///
/// Both inputs are sorted by timestamp first, since ring buffer delivery
/// across CPUs is not ordered. `tcp_events` is sorted in place. The result
/// is in ascending timestamp order.
pub fn correlate(tcp_events: &mut [TcpRecord], mut sched_events: Vec<SchedRecord>) -> Vec<SchedRecord> {
    sched_events.sort_by_key(|r| r.timestamp_ns);
    tcp_events.sort_by_key(|r| r.timestamp_ns);

    let selected = select_indices(tcp_events, &sched_events);

    // `selected` is strictly increasing, so one pass picks them out.
    let mut wanted = selected.into_iter().peekable();
    sched_events
        .into_iter()
        .enumerate()
        .filter_map(|(i, record)| {
            if wanted.peek() == Some(&i) {
                wanted.next();
                Some(record)
            } else {
                None
            }
        })
        .collect()
}

/// Indices into `sched` (sorted) that fall inside a window of `tcp` (sorted)
///
/// Sorting by send timestamp orders windows by their end, not their start:
/// a long send can open before an earlier short one. Windows are merged
/// into disjoint spans first so every index is visited at most once and an
/// event ahead of the last emitted one is never skipped.
fn select_indices(tcp: &[TcpRecord], sched: &[SchedRecord]) -> Vec<usize> {
    let mut selected = Vec::new();
    // One past the last emitted index; never moves backwards.
    let mut next_unemitted = 0usize;

    for (start, end) in merge_windows(tcp) {
        let first = sched.partition_point(|r| r.timestamp_ns < start);
        let mut i = first.max(next_unemitted);

        while let Some(record) = sched.get(i) {
            if record.timestamp_ns > end {
                break;
            }
            selected.push(i);
            i += 1;
            next_unemitted = i;
        }
    }

    selected
}

/// Union of all send windows as disjoint spans in ascending order
fn merge_windows(tcp: &[TcpRecord]) -> Vec<(u64, u64)> {
    let mut windows: Vec<(u64, u64)> = tcp.iter().map(TcpRecord::window).collect();
    windows.sort_unstable();

    let mut merged: Vec<(u64, u64)> = Vec::with_capacity(windows.len());
    for (start, end) in windows {
        match merged.last_mut() {
            // Inclusive bounds: touching windows share their boundary event
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}
