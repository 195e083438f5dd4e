//! Periodic anomaly evaluation
//!
//! Every tick drains the TCP stream, publishes the mean latency and, when the
//! slowest send crossed the threshold, drains the scheduling stream,
//! correlates it against the send windows and exports the evidence.
//!
//! The two drains are independent: a context switch appended between them
//! lands in the next tick, not the current dump.

use crate::{
    correlator::correlate,
    exporter::{DumpReport, EvidenceExporter},
    metrics::ProfilerMetrics,
    store::EventStore,
    types::LatencyStats,
};
use log::{debug, info, warn};
use std::{sync::Arc, time::Duration};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// What a single tick did
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// No TCP events since the last tick
    Idle,
    /// Statistics published, peak under the threshold
    Published(LatencyStats),
    /// Threshold crossed and evidence exported
    Dumped {
        stats: LatencyStats,
        /// Context switches that overlapped a send window
        correlated: usize,
        report: DumpReport,
    },
}

/// Evaluates the store on a fixed period
pub struct AnomalyEvaluator {
    store: Arc<EventStore>,
    metrics: Arc<ProfilerMetrics>,
    exporter: EvidenceExporter,
    threshold_ns: u64,
}

impl AnomalyEvaluator {
    /// Create an evaluator
    ///
    /// # Arguments
    ///
    /// * `store` - Shared event store
    /// * `metrics` - Metrics receiving the latency gauge and anomaly counts
    /// * `exporter` - Evidence writer used when the threshold is crossed
    /// * `threshold_ns` - Peak latency that triggers a dump (exclusive)
    pub fn new(
        store: Arc<EventStore>,
        metrics: Arc<ProfilerMetrics>,
        exporter: EvidenceExporter,
        threshold_ns: u64,
    ) -> Self {
        Self {
            store,
            metrics,
            exporter,
            threshold_ns,
        }
    }

    /// Run one evaluation cycle
    pub fn tick(&self) -> TickOutcome {
        let mut recent_tcp = self.store.drain_tcp();
        let Some(stats) = LatencyStats::from_records(&recent_tcp) else {
            return TickOutcome::Idle;
        };

        debug!(
            "avg TCP latency: {} ns over {} sends (max {} ns)",
            stats.avg_ns, stats.count, stats.max_ns
        );
        self.metrics.avg_tcp_latency.set(stats.avg_ns as f64);

        if stats.max_ns <= self.threshold_ns {
            return TickOutcome::Published(stats);
        }

        info!(
            "ANOMALY DETECTED! Max latency: {} ns (threshold {} ns). Dumping trace...",
            stats.max_ns, self.threshold_ns
        );
        self.metrics.anomalies.inc();

        let sched = self.store.drain_sched();
        let drained = sched.len();
        let correlated = correlate(&mut recent_tcp, sched);
        info!(
            "Correlated {} of {} context switches with {} sends",
            correlated.len(),
            drained,
            recent_tcp.len()
        );

        let report = self.exporter.dump(&recent_tcp, &correlated, stats);
        if report.failures > 0 {
            self.metrics.export_errors.inc_by(u64::from(report.failures));
        }

        TickOutcome::Dumped {
            stats,
            correlated: correlated.len(),
            report,
        }
    }

    /// Tick every `period` until `cancel` fires
    ///
    /// The first tick happens one full period after start. Ticks run inside
    /// `block_in_place` because exports do file and process I/O, so this
    /// must be driven by the multi-threaded runtime.
    pub async fn run(self, period: Duration, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let TickOutcome::Dumped { report, .. } =
                        tokio::task::block_in_place(|| self.tick())
                    {
                        if report.failures > 0 {
                            warn!("Anomaly dump finished with {} failed step(s)", report.failures);
                        }
                    }
                }
            }
        }

        debug!("Evaluator stopped");
    }
}
