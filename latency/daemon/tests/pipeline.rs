//! End-to-end pipeline: raw records through the consumer, store and evaluator
//! down to the exported evidence.

use anyhow::Result;
use bytes::Bytes;
use schedlat::{
    exporter::{DumpReport, Visualizer},
    resolver::{PidNameResolver, ProcessTable},
    types::kernel::constants::*,
    AnomalyEvaluator, EventProcessor, EventStore, EvidenceExporter, ProfilerMetrics, PruneAnchor,
    RawEvent, TickOutcome,
};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tokio::sync::mpsc;

struct Names;

impl ProcessTable for Names {
    fn process_name(&self, pid: u32) -> Result<String> {
        match pid {
            4242 => Ok("server".to_string()),
            0 => Ok("swapper/0".to_string()),
            _ => anyhow::bail!("no such process"),
        }
    }
}

#[derive(Default, Clone)]
struct Recorder {
    outputs: Arc<Mutex<Vec<PathBuf>>>,
}

impl Visualizer for Recorder {
    fn render(&self, output: &Path, tcp_csv: &Path, sched_csv: &Path) -> Result<()> {
        assert!(tcp_csv.exists());
        assert!(sched_csv.exists());
        self.outputs.lock().unwrap().push(output.to_path_buf());
        Ok(())
    }
}

fn tcp(ts: u64, duration: u64, size: u64) -> Bytes {
    Bytes::copy_from_slice(
        &RawEvent {
            event_type: EVENT_TYPE_TCP_SEND,
            pid: 4242,
            timestamp_ns: ts,
            duration_ns: duration,
            packet_size: size,
            ..RawEvent::default()
        }
        .to_bytes(),
    )
}

fn switch(ts: u64, prev: u32, next: u32) -> Bytes {
    Bytes::copy_from_slice(
        &RawEvent {
            event_type: EVENT_TYPE_SCHED_SWITCH,
            pid: prev,
            cpu: 3,
            timestamp_ns: ts,
            next_pid: next,
            ..RawEvent::default()
        }
        .to_bytes(),
    )
}

async fn ingest(records: Vec<Bytes>, store: &Arc<EventStore>, metrics: &Arc<ProfilerMetrics>) {
    let (tx, rx) = mpsc::channel(records.len().max(1));
    for record in records {
        tx.send(record).await.unwrap();
    }
    drop(tx);

    let processor = EventProcessor::with_resolver(
        Arc::clone(store),
        Arc::clone(metrics),
        PidNameResolver::with_table(Names),
    );
    processor.run(rx).await;
}

#[tokio::test]
async fn slow_send_exports_overlapping_switches() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(EventStore::new());
    let metrics = Arc::new(ProfilerMetrics::new().unwrap());
    let recorder = Recorder::default();

    ingest(
        vec![
            switch(1_000_000, 4242, 0),
            tcp(1_100_000, 150_000, 1_448),
            switch(900_000, 0, 4242),
            tcp(2_000_000, 1_000, 64),
            switch(1_500_000, 4242, 7),
            Bytes::from_static(&[1, 2, 3]),
        ],
        &store,
        &metrics,
    )
    .await;

    assert_eq!(store.len().tcp, 2);
    assert_eq!(store.len().sched, 3);

    let exporter = EvidenceExporter::new(dir.path().to_path_buf(), Some(Box::new(recorder.clone())));
    let evaluator = AnomalyEvaluator::new(
        Arc::clone(&store),
        Arc::clone(&metrics),
        exporter,
        DEFAULT_THRESHOLD_NS,
    );

    let TickOutcome::Dumped {
        stats,
        correlated,
        report,
    } = evaluator.tick()
    else {
        panic!("expected an anomaly dump");
    };

    // Slow send window is [950_000, 1_100_000]; the fast one [1_999_000, 2_000_000]
    assert_eq!(stats.max_ns, 150_000);
    assert_eq!(stats.avg_ns, 75_500);
    assert_eq!(correlated, 1);
    assert!(report.visualized);
    assert_eq!(report.failures, 0);
    assert!(store.is_empty());

    let sched_csv = std::fs::read_to_string(dir.path().join(SCHED_CSV_FILE)).unwrap();
    assert_eq!(
        sched_csv,
        format!("{SCHED_CSV_HEADER}\n1000000,3,4242,0,server,swapper/0\n")
    );

    let outputs = recorder.outputs.lock().unwrap();
    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].starts_with(dir.path().join(ANOMALY_DIR)));

    let manifest = std::fs::read_to_string(outputs[0].with_extension("json")).unwrap();
    let parsed: DumpReport = serde_json::from_str(&manifest).unwrap();
    assert_eq!(parsed.tcp_records, 2);
    assert_eq!(parsed.sched_records, 1);

    assert_eq!(metrics.anomalies.get(), 1);
    assert_eq!(metrics.decode_errors.get(), 1);
    assert_eq!(metrics.avg_tcp_latency.get(), 75_500.0);
}

#[tokio::test]
async fn quiet_traffic_only_publishes_and_prunes() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(EventStore::new());
    let metrics = Arc::new(ProfilerMetrics::new().unwrap());

    ingest(
        vec![
            switch(1_000, 1, 2),
            switch(3_000_000_000, 2, 1),
            tcp(4_000_000_000, 20_000, 10),
        ],
        &store,
        &metrics,
    )
    .await;

    let evaluator = AnomalyEvaluator::new(
        Arc::clone(&store),
        Arc::clone(&metrics),
        EvidenceExporter::new(dir.path().to_path_buf(), None),
        DEFAULT_THRESHOLD_NS,
    );

    // Retention of 2s behind the newest send drops the first switch only
    assert_eq!(store.prune_with(PruneAnchor::LatestTcp, DEFAULT_RETENTION_NS), 1);
    assert_eq!(store.snapshot_sched()[0].timestamp_ns, 3_000_000_000);

    assert!(matches!(evaluator.tick(), TickOutcome::Published(_)));
    assert_eq!(metrics.avg_tcp_latency.get(), 20_000.0);
    assert_eq!(store.len().sched, 1);
    assert!(!dir.path().join(TCP_CSV_FILE).exists());
}
