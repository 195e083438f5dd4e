//! schedlat - TCP send latency vs scheduler switch profiler
//!
//! Loads the probe object, traces `tcp_sendmsg` latency of one process
//! alongside every context switch, and dumps the switches that overlapped
//! slow sends whenever the peak latency crosses the threshold.
//!
//! ## Usage
//!
//! ```bash
//! # Profile PID 4242 with the default 80us threshold
//! sudo ./schedlat --pid 4242 --ebpf-object target/bpf/schedlat.bpf.o
//!
//! # Render each anomaly with an external Gantt script
//! sudo ./schedlat --pid 4242 --visualizer "python3 gantt.py"
//!
//! # Tighter threshold, no metrics endpoint
//! sudo ./schedlat --pid 4242 --threshold-ns 50000 --no-metrics
//! ```

use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::{info, warn};
use schedlat::{
    config::ProfilerConfig,
    events::{spawn_progress_reporter, spawn_pruner, ConsumerStats},
    exporter::Visualizer,
    types::kernel::constants::*,
    AnomalyEvaluator, CommandVisualizer, EventProcessor, EventStore, EvidenceExporter,
    ProbeLoader, ProfilerMetrics, PruneAnchor, RingBufSource,
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AnchorArg {
    /// Newest TCP send
    LatestTcp,
    /// Newest event of either kind
    LatestEvent,
}

impl From<AnchorArg> for PruneAnchor {
    fn from(arg: AnchorArg) -> Self {
        match arg {
            AnchorArg::LatestTcp => PruneAnchor::LatestTcp,
            AnchorArg::LatestEvent => PruneAnchor::LatestEvent,
        }
    }
}

/// TCP send latency vs scheduler switch profiler
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Process to profile
    #[clap(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    pid: u32,

    /// Path to the probe object (if not embedded)
    #[clap(long)]
    ebpf_object: Option<PathBuf>,

    /// Peak send latency that triggers a dump, in nanoseconds
    #[clap(long, default_value_t = DEFAULT_THRESHOLD_NS)]
    threshold_ns: u64,

    /// Evaluation period in milliseconds
    #[clap(long, default_value_t = DEFAULT_EVAL_INTERVAL_MS)]
    interval_ms: u64,

    /// History kept behind the prune anchor, in nanoseconds
    #[clap(long, default_value_t = DEFAULT_RETENTION_NS)]
    retention_ns: u64,

    /// Pruning period in milliseconds (0 = disabled)
    #[clap(long, default_value_t = DEFAULT_PRUNE_INTERVAL_MS)]
    prune_interval_ms: u64,

    /// Timestamp the retention window is measured back from
    #[clap(long, value_enum, default_value_t = AnchorArg::LatestTcp)]
    prune_anchor: AnchorArg,

    /// Directory receiving CSVs and the anomalies/ folder
    #[clap(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Command rendering each anomaly, e.g. "python3 gantt.py"
    #[clap(long)]
    visualizer: Option<String>,

    /// Metrics endpoint bind address
    #[clap(long, default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Disable the metrics endpoint
    #[clap(long)]
    no_metrics: bool,

    /// Progress reporting interval in seconds
    #[clap(long, default_value_t = 10)]
    progress_interval: u64,

    /// Verbose logging
    #[clap(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> ProfilerConfig {
        ProfilerConfig {
            target_pid: self.pid,
            ebpf_object: self.ebpf_object,
            threshold_ns: self.threshold_ns,
            eval_interval: Duration::from_millis(self.interval_ms),
            retention_ns: self.retention_ns,
            prune_interval: (self.prune_interval_ms > 0)
                .then(|| Duration::from_millis(self.prune_interval_ms)),
            prune_anchor: self.prune_anchor.into(),
            output_dir: self.output_dir,
            visualizer: self.visualizer,
            metrics_addr: (!self.no_metrics).then_some(self.metrics_addr),
            progress_interval_secs: self.progress_interval,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let config = args.into_config();
    config.validate()?;

    info!("Starting schedlat...");
    info!("   Target PID: {}", config.target_pid);
    info!("   Threshold: {} ns", config.threshold_ns);
    info!("   Interval: {:?}", config.eval_interval);
    info!("   Output: {:?}", config.output_dir);

    let mut loader = ProbeLoader::load(config.ebpf_object.clone(), config.target_pid)?;
    loader.attach_kprobes()?;
    loader.attach_tracepoints()?;
    let ring_buf = loader.take_ring_buf()?;

    let cancel = CancellationToken::new();
    let store = Arc::new(EventStore::new());
    let metrics = Arc::new(ProfilerMetrics::new()?);

    if let Some(addr) = &config.metrics_addr {
        Arc::clone(&metrics).serve(addr, cancel.clone()).await?;
    }

    let source = RingBufSource::new(ring_buf, cancel.clone())?;
    let consumer = tokio::spawn(
        EventProcessor::new(Arc::clone(&store), Arc::clone(&metrics)).run(source),
    );

    let visualizer = config.visualizer.as_deref().and_then(|command_line| {
        let visualizer = CommandVisualizer::from_command_line(command_line);
        if visualizer.is_none() {
            warn!("Empty visualizer command, anomalies will not be rendered");
        }
        visualizer.map(|v| Box::new(v) as Box<dyn Visualizer>)
    });
    let exporter = EvidenceExporter::new(config.output_dir.clone(), visualizer);
    let evaluator = AnomalyEvaluator::new(
        Arc::clone(&store),
        Arc::clone(&metrics),
        exporter,
        config.threshold_ns,
    );
    let evaluator = tokio::spawn(evaluator.run(config.eval_interval, cancel.clone()));

    let pruner = config.prune_interval.map(|period| {
        spawn_pruner(
            Arc::clone(&store),
            config.prune_anchor,
            config.retention_ns,
            period,
            cancel.clone(),
        )
    });
    let progress = spawn_progress_reporter(
        Arc::clone(&store),
        config.progress_interval_secs,
        cancel.clone(),
    );

    info!("Profiling... press Ctrl-C to stop");
    wait_for_shutdown().await?;
    info!("Interrupted, shutting down...");
    cancel.cancel();

    let stats = consumer.await?;
    evaluator.await?;
    if let Some(pruner) = pruner {
        pruner.await?;
    }
    progress.await?;

    print_summary(config.target_pid, &stats);

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }

    Ok(())
}

fn print_summary(target_pid: u32, stats: &ConsumerStats) {
    info!("");
    info!("============================================");
    info!("             Summary Report");
    info!("============================================");
    info!("");
    info!("  Target PID:          {}", target_pid);
    info!("  TCP sends:           {:>8}", stats.tcp_events);
    info!("  Context switches:    {:>8}", stats.sched_events);
    info!("  Dropped records:     {:>8}", stats.decode_errors);
    info!("  Read errors:         {:>8}", stats.read_errors);
    info!("");
    info!("============================================");
}
