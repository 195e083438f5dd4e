//! Event ingestion from the kernel ring buffer
//!
//! A single consumer task pulls raw records from a [`RecordSource`], decodes
//! them, resolves task names and appends to the store. Decoding and name
//! lookups happen before the store lock is taken.

use crate::{
    decoder::decode,
    metrics::ProfilerMetrics,
    resolver::{PidNameResolver, ProcessTable, ProcfsTable},
    store::{EventStore, PruneAnchor},
    types::{Event, SchedRecord, TcpRecord},
};
use aya::maps::{MapData, RingBuf};
use bytes::Bytes;
use log::{debug, info, warn};
use std::{collections::VecDeque, future::Future, io, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{io::unix::AsyncFd, sync::mpsc, time::interval};
use tokio_util::sync::CancellationToken;

/// Why a read from a record source did not produce a record
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source was shut down; no further records will arrive
    #[error("record source closed")]
    Closed,

    /// A recoverable read failure
    #[error("transient read error: {0}")]
    Transient(#[from] io::Error),
}

/// A blocking-style stream of raw kernel records
pub trait RecordSource: Send {
    /// Wait for the next record
    fn next_record(&mut self) -> impl Future<Output = Result<Bytes, SourceError>> + Send;
}

/// Reads the probe's ring buffer map
///
/// Reports [`SourceError::Closed`] once `cancel` fires.
pub struct RingBufSource {
    fd: AsyncFd<RingBuf<MapData>>,
    pending: VecDeque<Bytes>,
    cancel: CancellationToken,
}

impl RingBufSource {
    pub fn new(ring_buf: RingBuf<MapData>, cancel: CancellationToken) -> io::Result<Self> {
        Ok(Self {
            fd: AsyncFd::new(ring_buf)?,
            pending: VecDeque::new(),
            cancel,
        })
    }
}

impl RecordSource for RingBufSource {
    fn next_record(&mut self) -> impl Future<Output = Result<Bytes, SourceError>> + Send {
        async move {
            loop {
                if self.cancel.is_cancelled() {
                    return Err(SourceError::Closed);
                }
                if let Some(record) = self.pending.pop_front() {
                    return Ok(record);
                }

                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(SourceError::Closed),
                    result = self.fd.readable_mut() => {
                        let mut guard = result?;

                        // Drain everything that is ready in one wakeup
                        let ring_buf = guard.get_inner_mut();
                        while let Some(item) = ring_buf.next() {
                            self.pending.push_back(Bytes::copy_from_slice(&item));
                        }

                        guard.clear_ready();
                    }
                }
            }
        }
    }
}

/// Channel-fed source; closed once every sender is dropped
impl RecordSource for mpsc::Receiver<Bytes> {
    fn next_record(&mut self) -> impl Future<Output = Result<Bytes, SourceError>> + Send {
        async move { self.recv().await.ok_or(SourceError::Closed) }
    }
}

/// Totals for one consumer run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub tcp_events: u64,
    pub sched_events: u64,
    pub decode_errors: u64,
    pub read_errors: u64,
}

/// Decodes records and feeds the event store
pub struct EventProcessor<T = ProcfsTable> {
    store: Arc<EventStore>,
    resolver: PidNameResolver<T>,
    metrics: Arc<ProfilerMetrics>,
    stats: ConsumerStats,
}

impl EventProcessor<ProcfsTable> {
    /// Create an event processor resolving names through procfs
    ///
    /// # Arguments
    ///
    /// * `store` - Shared event store
    /// * `metrics` - Counters for ingested and rejected records
    pub fn new(store: Arc<EventStore>, metrics: Arc<ProfilerMetrics>) -> Self {
        Self::with_resolver(store, metrics, PidNameResolver::new())
    }
}

impl<T: ProcessTable> EventProcessor<T> {
    pub fn with_resolver(
        store: Arc<EventStore>,
        metrics: Arc<ProfilerMetrics>,
        resolver: PidNameResolver<T>,
    ) -> Self {
        Self {
            store,
            resolver,
            metrics,
            stats: ConsumerStats::default(),
        }
    }

    /// Decode one raw record and append it to the store
    ///
    /// Undecodable records are counted and dropped.
    pub fn ingest(&mut self, raw: &[u8]) {
        let event = match decode(raw) {
            Ok(event) => event,
            Err(e) => {
                debug!("Dropping record: {}", e);
                self.stats.decode_errors += 1;
                self.metrics.decode_errors.inc();
                return;
            }
        };

        match event {
            Event::TcpSend {
                timestamp_ns,
                duration_ns,
                size_bytes,
            } => {
                self.store.append_tcp(TcpRecord {
                    timestamp_ns,
                    duration_ns,
                    size_bytes,
                });
                self.stats.tcp_events += 1;
                self.metrics.tcp_events.inc();
            }
            Event::SchedSwitch {
                timestamp_ns,
                cpu,
                prev_pid,
                next_pid,
            } => {
                let prev_name = self.resolver.resolve(prev_pid);
                let next_name = self.resolver.resolve(next_pid);
                self.store.append_sched(SchedRecord {
                    timestamp_ns,
                    cpu,
                    prev_pid,
                    next_pid,
                    prev_name,
                    next_name,
                });
                self.stats.sched_events += 1;
                self.metrics.sched_events.inc();
            }
        }
    }

    /// Consume `source` until it reports closed
    ///
    /// Transient read errors are logged and retried.
    pub async fn run<S: RecordSource>(mut self, mut source: S) -> ConsumerStats {
        loop {
            match source.next_record().await {
                Ok(raw) => self.ingest(&raw),
                Err(SourceError::Closed) => break,
                Err(e) => {
                    warn!("Error reading ring buffer: {}", e);
                    self.stats.read_errors += 1;
                    self.metrics.read_errors.inc();
                }
            }
        }

        info!(
            "Event consumer stopped: {} TCP sends, {} context switches, {} dropped",
            self.stats.tcp_events, self.stats.sched_events, self.stats.decode_errors
        );
        self.stats
    }
}

/// Spawn progress reporter
///
/// Periodically logs how many events the store is holding.
pub fn spawn_progress_reporter(
    store: Arc<EventStore>,
    interval_secs: u64,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let counts = store.len();
                    info!(
                        "Progress: {} TCP sends, {} context switches buffered",
                        counts.tcp, counts.sched
                    );
                }
            }
        }
    })
}

/// Spawn the pruner
///
/// Calls [`EventStore::prune_with`] every `period`, independently of TCP
/// arrivals.
pub fn spawn_pruner(
    store: Arc<EventStore>,
    anchor: PruneAnchor,
    retention_ns: u64,
    period: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = store.prune_with(anchor, retention_ns);
                    if removed > 0 {
                        debug!("Pruned {} events older than {} ns", removed, retention_ns);
                    }
                }
            }
        }
    })
}
