//! Evidence exporters
//!
//! Writes anomaly evidence (raw sends plus correlated context switches) to
//! CSV, records a JSON manifest of each dump, and hands the CSVs to an
//! external visualizer.

use crate::types::{kernel::constants::*, LatencyStats, SchedRecord, TcpRecord};
use anyhow::{bail, Context, Result};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    process::Command,
};

/// Renders the exported CSVs into a human-readable artifact
pub trait Visualizer: Send + Sync {
    /// Render evidence
    ///
    /// # Arguments
    ///
    /// * `output` - Path of the artifact to produce
    /// * `tcp_csv` - Exported TCP sends
    /// * `sched_csv` - Exported correlated context switches
    fn render(&self, output: &Path, tcp_csv: &Path, sched_csv: &Path) -> Result<()>;
}

/// Runs an external program as `<program> [args…] <output> <tcp_csv> <sched_csv>`
#[derive(Debug, Clone)]
pub struct CommandVisualizer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandVisualizer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a whitespace-separated command line, e.g.
    /// `"python3 scripts/gantt.py"`
    ///
    /// Returns `None` for a blank command line. No shell quoting is applied.
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program, parts.map(str::to_string).collect()))
    }
}

impl Visualizer for CommandVisualizer {
    fn render(&self, output: &Path, tcp_csv: &Path, sched_csv: &Path) -> Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(output)
            .arg(tcp_csv)
            .arg(sched_csv)
            .status()
            .with_context(|| format!("Failed to run visualizer {:?}", self.program))?;

        if !status.success() {
            bail!("Visualizer {:?} exited with {}", self.program, status);
        }

        Ok(())
    }
}

/// Manifest written next to each rendered artifact
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DumpReport {
    /// RFC 3339 wall-clock time of the dump
    pub timestamp: String,
    /// Statistics of the tick that triggered the dump
    pub stats: LatencyStats,
    pub tcp_records: usize,
    pub sched_records: usize,
    pub tcp_csv: PathBuf,
    pub sched_csv: PathBuf,
    /// Artifact handed to the visualizer
    pub output: PathBuf,
    /// Whether the visualizer ran and succeeded
    pub visualized: bool,
    /// Number of steps that failed (CSV writes, visualizer, manifest)
    pub failures: u32,
}

/// Writes evidence for one anomalous tick
pub struct EvidenceExporter {
    output_dir: PathBuf,
    visualizer: Option<Box<dyn Visualizer>>,
}

impl EvidenceExporter {
    /// Create an exporter
    ///
    /// # Arguments
    ///
    /// * `output_dir` - Directory receiving the CSVs and the `anomalies/` folder
    /// * `visualizer` - External renderer; `None` skips rendering
    pub fn new(output_dir: PathBuf, visualizer: Option<Box<dyn Visualizer>>) -> Self {
        Self {
            output_dir,
            visualizer,
        }
    }

    pub fn tcp_csv_path(&self) -> PathBuf {
        self.output_dir.join(TCP_CSV_FILE)
    }

    pub fn sched_csv_path(&self) -> PathBuf {
        self.output_dir.join(SCHED_CSV_FILE)
    }

    /// Export one anomaly
    ///
    /// No step is fatal: failures are logged and tallied in the report.
    /// Rendering is skipped when either CSV could not be written, so the
    /// visualizer never reads a stale file.
    pub fn dump(&self, tcp: &[TcpRecord], sched: &[SchedRecord], stats: LatencyStats) -> DumpReport {
        let now = chrono::Local::now();
        let stamp = now.format("%H:%M:%S").to_string();
        let anomaly_dir = self.output_dir.join(ANOMALY_DIR);
        let output = anomaly_dir.join(format!("{stamp}.html"));

        let mut report = DumpReport {
            timestamp: now.to_rfc3339(),
            stats,
            tcp_records: tcp.len(),
            sched_records: sched.len(),
            tcp_csv: self.tcp_csv_path(),
            sched_csv: self.sched_csv_path(),
            output,
            visualized: false,
            failures: 0,
        };

        let mut csv_ok = true;
        match write_file(&report.tcp_csv, &tcp_csv(tcp)) {
            Ok(()) => info!("Saved {} TCP records to {:?}", tcp.len(), report.tcp_csv),
            Err(e) => {
                error!("{:#}", e);
                report.failures += 1;
                csv_ok = false;
            }
        }
        match write_file(&report.sched_csv, &sched_csv(sched)) {
            Ok(()) => info!(
                "Saved {} scheduling records to {:?}",
                sched.len(),
                report.sched_csv
            ),
            Err(e) => {
                error!("{:#}", e);
                report.failures += 1;
                csv_ok = false;
            }
        }

        if let Err(e) = fs::create_dir_all(&anomaly_dir) {
            error!("Failed to create {:?}: {}", anomaly_dir, e);
            report.failures += 1;
        }

        match &self.visualizer {
            Some(_) if !csv_ok => warn!("Skipping visualization: evidence CSVs are incomplete"),
            Some(visualizer) => {
                match visualizer.render(&report.output, &report.tcp_csv, &report.sched_csv) {
                    Ok(()) => {
                        info!("Rendered anomaly to {:?}", report.output);
                        report.visualized = true;
                    }
                    Err(e) => {
                        error!("Visualization failed: {:#}", e);
                        report.failures += 1;
                    }
                }
            }
            None => debug!("No visualizer configured"),
        }

        let manifest = report.output.with_extension("json");
        let written = serde_json::to_string_pretty(&report)
            .context("Failed to serialize dump report")
            .and_then(|json| write_file(&manifest, &json));
        if let Err(e) = written {
            error!("{:#}", e);
            report.failures += 1;
        }

        report
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("Failed to create output file: {:?}", path))?;

    file.write_all(contents.as_bytes())
        .with_context(|| format!("Failed to write to output file: {:?}", path))?;

    Ok(())
}

/// Render TCP sends as CSV
pub fn tcp_csv(records: &[TcpRecord]) -> String {
    let mut output = String::with_capacity(TCP_CSV_HEADER.len() + 1 + records.len() * 32);
    output.push_str(TCP_CSV_HEADER);
    output.push('\n');

    for r in records {
        output.push_str(&format!(
            "{},{},{}\n",
            r.timestamp_ns, r.duration_ns, r.size_bytes
        ));
    }

    output
}

/// Render context switches as CSV
pub fn sched_csv(records: &[SchedRecord]) -> String {
    let mut output = String::with_capacity(SCHED_CSV_HEADER.len() + 1 + records.len() * 64);
    output.push_str(SCHED_CSV_HEADER);
    output.push('\n');

    for r in records {
        output.push_str(&format!(
            "{},{},{},{},{},{}\n",
            r.timestamp_ns,
            r.cpu,
            r.prev_pid,
            r.next_pid,
            csv_field(&r.prev_name),
            csv_field(&r.next_name)
        ));
    }

    output
}

/// Quote a field if it contains a delimiter, quote or line break
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}
