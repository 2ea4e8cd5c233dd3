//! Request counters and latencies, exposed in the Prometheus text format.

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use shared::DatasetKind;
use std::time::Duration;

pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    latency: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("aqcast_requests_total", "HTTP requests by route and status"),
            &["method", "path", "status"],
        )?;
        let latency = HistogramVec::new(
            HistogramOpts::new(
                "aqcast_request_duration_seconds",
                "HTTP request latency by route",
            ),
            &["method", "path"],
        )?;
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(latency.clone()))?;

        Ok(Metrics {
            registry,
            requests,
            latency,
        })
    }

    pub fn observe(&self, method: &str, path: &str, status: u16, elapsed: Duration) {
        let path = route_label(path);
        self.requests
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
        self.latency
            .with_label_values(&[method, path])
            .observe(elapsed.as_secs_f64());
    }

    pub fn render(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = vec![];
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Route template of a request path. Unknown paths share one label.
fn route_label(path: &str) -> &'static str {
    match path.trim_end_matches('/') {
        "/health" => "/health",
        "/metrics" => "/metrics",
        other => other
            .strip_prefix('/')
            .and_then(|name| name.parse::<DatasetKind>().ok())
            .map(|kind| match kind {
                DatasetKind::Stations => "/stations",
                DatasetKind::Grid => "/grid",
                DatasetKind::Streets => "/streets",
                DatasetKind::Lor => "/lor",
                DatasetKind::Simulation => "/simulation",
            })
            .unwrap_or("unmatched"),
    }
}
