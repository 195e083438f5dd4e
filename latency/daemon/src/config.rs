//! Runtime configuration
//!
//! Built by the binary from its command line; the library itself never
//! reads the environment.

use crate::{store::PruneAnchor, types::kernel::constants::*};
use std::{path::PathBuf, time::Duration};

/// Settings for one profiling session
#[derive(Debug, Clone)]
pub struct ProfilerConfig {
    /// Process whose TCP sends are traced
    pub target_pid: u32,
    /// Probe object; `None` uses the embedded object if compiled in
    pub ebpf_object: Option<PathBuf>,
    /// Peak latency that triggers an evidence dump (exclusive)
    pub threshold_ns: u64,
    /// Evaluator period
    pub eval_interval: Duration,
    /// History kept behind the prune anchor
    pub retention_ns: u64,
    /// Pruner period; `None` disables the pruner
    pub prune_interval: Option<Duration>,
    pub prune_anchor: PruneAnchor,
    /// Directory receiving CSVs and the `anomalies/` folder
    pub output_dir: PathBuf,
    /// Visualizer command line, e.g. `python3 gantt.py`
    pub visualizer: Option<String>,
    /// Bind address of the metrics endpoint; `None` disables it
    pub metrics_addr: Option<String>,
    /// Seconds between progress log lines
    pub progress_interval_secs: u64,
}

impl ProfilerConfig {
    /// Defaults for profiling `target_pid`
    pub fn new(target_pid: u32) -> Self {
        Self {
            target_pid,
            ebpf_object: None,
            threshold_ns: DEFAULT_THRESHOLD_NS,
            eval_interval: Duration::from_millis(DEFAULT_EVAL_INTERVAL_MS),
            retention_ns: DEFAULT_RETENTION_NS,
            prune_interval: Some(Duration::from_millis(DEFAULT_PRUNE_INTERVAL_MS)),
            prune_anchor: PruneAnchor::LatestTcp,
            output_dir: PathBuf::from("."),
            visualizer: None,
            metrics_addr: Some("0.0.0.0:8080".to_string()),
            progress_interval_secs: 10,
        }
    }

    /// Reject settings that would make the pipeline spin or never run
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.target_pid == 0 {
            anyhow::bail!("target PID must be greater than 0");
        }
        if self.eval_interval.is_zero() {
            anyhow::bail!("evaluation interval must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProfilerConfig::new(1234);

        assert_eq!(config.threshold_ns, 80_000);
        assert_eq!(config.eval_interval, Duration::from_secs(1));
        assert_eq!(config.retention_ns, 2_000_000_000);
        assert_eq!(config.prune_anchor, PruneAnchor::LatestTcp);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_pid_and_interval() {
        assert!(ProfilerConfig::new(0).validate().is_err());

        let mut config = ProfilerConfig::new(1);
        config.eval_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
