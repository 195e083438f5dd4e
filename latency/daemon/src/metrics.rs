//! Prometheus metrics and the scrape endpoint
//!
//! Metrics live in a registry owned by [`ProfilerMetrics`], constructed once
//! at startup and handed to the components that update them.

use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, routing::get, Router};
use log::{error, info};
use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Metrics updated by the consumer and the evaluator
pub struct ProfilerMetrics {
    registry: Registry,

    /// Mean send latency over the last evaluator tick (nanoseconds)
    pub avg_tcp_latency: Gauge,
    /// TCP send records appended to the store
    pub tcp_events: IntCounter,
    /// Context switch records appended to the store
    pub sched_events: IntCounter,
    /// Ring buffer samples that failed to decode
    pub decode_errors: IntCounter,
    /// Transient ring buffer read failures
    pub read_errors: IntCounter,
    /// Ticks whose peak latency crossed the threshold
    pub anomalies: IntCounter,
    /// Failed CSV, manifest or visualizer steps
    pub export_errors: IntCounter,
}

impl ProfilerMetrics {
    /// Create and register all metrics in a fresh registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let avg_tcp_latency = Gauge::new("avg_tcp_latency", "Average latency of TCP send requests")?;
        let tcp_events = IntCounter::new(
            "schedlat_tcp_events_total",
            "TCP send completions recorded",
        )?;
        let sched_events = IntCounter::new(
            "schedlat_sched_events_total",
            "Scheduler context switches recorded",
        )?;
        let decode_errors = IntCounter::new(
            "schedlat_decode_errors_total",
            "Ring buffer records dropped as undecodable",
        )?;
        let read_errors = IntCounter::new(
            "schedlat_read_errors_total",
            "Transient ring buffer read errors",
        )?;
        let anomalies = IntCounter::new(
            "schedlat_anomalies_total",
            "Evaluator ticks whose peak latency exceeded the threshold",
        )?;
        let export_errors = IntCounter::new(
            "schedlat_export_errors_total",
            "Evidence export steps that failed",
        )?;

        registry.register(Box::new(avg_tcp_latency.clone()))?;
        registry.register(Box::new(tcp_events.clone()))?;
        registry.register(Box::new(sched_events.clone()))?;
        registry.register(Box::new(decode_errors.clone()))?;
        registry.register(Box::new(read_errors.clone()))?;
        registry.register(Box::new(anomalies.clone()))?;
        registry.register(Box::new(export_errors.clone()))?;

        Ok(Self {
            registry,
            avg_tcp_latency,
            tcp_events,
            sched_events,
            decode_errors,
            read_errors,
            anomalies,
            export_errors,
        })
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("encoding metrics")?;
        String::from_utf8(buffer).context("metrics are not valid UTF-8")
    }

    /// Serve `/metrics` and `/healthz` until `cancel` fires
    ///
    /// Binding happens before this returns so that a bad address fails
    /// startup; the server itself runs on a spawned task.
    pub async fn serve(self: Arc<Self>, addr: &str, cancel: CancellationToken) -> Result<()> {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/healthz", get(healthz_handler))
            .with_state(self);

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("listening on {addr}"))?;
        let local_addr = listener.local_addr().context("getting local address")?;

        tokio::spawn(async move {
            info!("Metrics endpoint listening on http://{}/metrics", local_addr);

            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await;

            if let Err(e) = result {
                error!("Metrics server error: {}", e);
            }
        });

        Ok(())
    }
}

/// GET /metrics
async fn metrics_handler(State(metrics): State<Arc<ProfilerMetrics>>) -> (StatusCode, String) {
    match metrics.render() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => {
            error!("Failed to render metrics: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "encoding error".to_string())
        }
    }
}

/// GET /healthz
async fn healthz_handler() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_gauge_and_counters() {
        let metrics = ProfilerMetrics::new().unwrap();
        metrics.avg_tcp_latency.set(400.0);
        metrics.tcp_events.inc_by(2);

        let text = metrics.render().unwrap();

        assert!(text.contains("# TYPE avg_tcp_latency gauge"));
        assert!(text.contains("avg_tcp_latency 400"));
        assert!(text.contains("schedlat_tcp_events_total 2"));
        assert!(text.contains("schedlat_anomalies_total 0"));
    }

    #[test]
    fn test_instances_do_not_share_state() {
        let a = ProfilerMetrics::new().unwrap();
        let b = ProfilerMetrics::new().unwrap();
        a.anomalies.inc();

        assert_eq!(a.anomalies.get(), 1);
        assert_eq!(b.anomalies.get(), 0);
    }

    #[tokio::test]
    async fn test_serve_binds_and_stops() {
        let metrics = Arc::new(ProfilerMetrics::new().unwrap());
        let cancel = CancellationToken::new();

        metrics
            .clone()
            .serve("127.0.0.1:0", cancel.clone())
            .await
            .unwrap();
        cancel.cancel();
    }
}
