//! schedlat userspace library
//!
//! Ingests TCP send and context switch records from the kernel probe,
//! evaluates send latency on a fixed period and, on anomalies, exports the
//! context switches that overlapped the slow sends.

pub mod config;
pub mod correlator;
pub mod decoder;
pub mod evaluator;
pub mod events;
pub mod exporter;
pub mod loader;
pub mod metrics;
pub mod resolver;
pub mod store;
pub mod types;

pub use config::ProfilerConfig;
pub use correlator::correlate;
pub use decoder::{decode, DecodeError};
pub use evaluator::{AnomalyEvaluator, TickOutcome};
pub use events::{EventProcessor, RecordSource, RingBufSource, SourceError};
pub use exporter::{CommandVisualizer, EvidenceExporter, Visualizer};
pub use loader::ProbeLoader;
pub use metrics::ProfilerMetrics;
pub use resolver::PidNameResolver;
pub use store::{EventStore, PruneAnchor};
pub use types::*;
