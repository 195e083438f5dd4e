//! Time-bounded event store
//!
//! Holds the two event streams between the ring buffer consumer and the
//! evaluator. Both sequences keep arrival order, which is not timestamp
//! order once several CPUs feed the ring buffer. Anything that needs
//! timestamp order sorts its own copy.

use crate::types::{SchedRecord, StoreCounts, TcpRecord};
use parking_lot::RwLock;

/// Which timestamp the prune cutoff is measured back from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PruneAnchor {
    /// Newest TCP event only; nothing is pruned while TCP is quiet
    #[default]
    LatestTcp,
    /// Newest event in either stream
    LatestEvent,
}

#[derive(Default)]
struct Streams {
    sched: Vec<SchedRecord>,
    tcp: Vec<TcpRecord>,
}

/// Thread-safe store for scheduling and TCP events
///
/// Mutations take the write lock, snapshots take the read lock. Callers
/// only ever receive copies.
#[derive(Default)]
pub struct EventStore {
    inner: RwLock<Streams>,
}

impl EventStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_tcp(&self, record: TcpRecord) {
        self.inner.write().tcp.push(record);
    }

    pub fn append_sched(&self, record: SchedRecord) {
        self.inner.write().sched.push(record);
    }

    /// Copy of all TCP events, in arrival order
    pub fn snapshot_tcp(&self) -> Vec<TcpRecord> {
        self.inner.read().tcp.clone()
    }

    /// Copy of all scheduling events, in arrival order
    pub fn snapshot_sched(&self) -> Vec<SchedRecord> {
        self.inner.read().sched.clone()
    }

    /// Take every TCP event, leaving the stream empty
    pub fn drain_tcp(&self) -> Vec<TcpRecord> {
        std::mem::take(&mut self.inner.write().tcp)
    }

    /// Take every scheduling event, leaving the stream empty
    pub fn drain_sched(&self) -> Vec<SchedRecord> {
        std::mem::take(&mut self.inner.write().sched)
    }

    /// Current stream lengths
    pub fn len(&self) -> StoreCounts {
        let streams = self.inner.read();
        StoreCounts {
            tcp: streams.tcp.len(),
            sched: streams.sched.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        let streams = self.inner.read();
        streams.tcp.is_empty() && streams.sched.is_empty()
    }

    /// Drop events older than `retention_ns` before the newest TCP event
    ///
    /// A no-op while there are no TCP events, even if scheduling events
    /// keep arriving.
    pub fn prune(&self, retention_ns: u64) {
        self.prune_with(PruneAnchor::LatestTcp, retention_ns);
    }

    /// Drop events older than `retention_ns` before the given anchor
    ///
    /// Events with `timestamp >= cutoff` are all kept, in their original
    /// order. Returns the number of events removed across both streams.
    pub fn prune_with(&self, anchor: PruneAnchor, retention_ns: u64) -> usize {
        let mut streams = self.inner.write();

        let latest_tcp = streams.tcp.iter().map(|r| r.timestamp_ns).max();
        let latest = match anchor {
            PruneAnchor::LatestTcp => latest_tcp,
            PruneAnchor::LatestEvent => {
                let latest_sched = streams.sched.iter().map(|r| r.timestamp_ns).max();
                latest_tcp.max(latest_sched)
            }
        };
        let Some(latest) = latest else {
            return 0;
        };
        let cutoff = latest.saturating_sub(retention_ns);

        let before = streams.tcp.len() + streams.sched.len();
        streams.tcp.retain(|r| r.timestamp_ns >= cutoff);
        streams.sched.retain(|r| r.timestamp_ns >= cutoff);
        before - (streams.tcp.len() + streams.sched.len())
    }
}
