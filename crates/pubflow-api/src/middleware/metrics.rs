//! # Prometheus Metrics
//!
//! HTTP-level metrics (request counts, latency, errors, conflicts) are
//! recorded in middleware. Lifecycle gauges (artifacts by state, effect
//! delivery counts) are refreshed on each `/metrics` scrape; see the
//! metrics handler in `lib.rs`.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use prometheus::core::Collector;
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

use pubflow_notify::DeliveryReport;

/// Shared metrics state backed by a Prometheus registry.
#[derive(Clone)]
pub struct ApiMetrics {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,

    // -- HTTP middleware metrics (push model) --
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_errors_total: IntCounterVec,
    /// 409 responses: invalid transitions, pending requests, lost races.
    http_conflicts_total: IntCounterVec,

    // -- Lifecycle gauges (pull model, updated on /metrics scrape) --
    artifacts_total: GaugeVec,
    effects_total: GaugeVec,
}

impl std::fmt::Debug for ApiMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiMetrics")
            .field("requests", &self.requests())
            .field("errors", &self.errors())
            .finish()
    }
}

impl ApiMetrics {
    /// Create a metrics instance with a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("pubflow_http_requests_total", "Total HTTP requests"),
            &["method", "path", "status"],
        )?;
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "pubflow_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["method", "path"],
        )?;
        let http_errors_total = IntCounterVec::new(
            Opts::new("pubflow_http_errors_total", "Total HTTP errors (4xx and 5xx)"),
            &["method", "path", "status"],
        )?;
        let http_conflicts_total = IntCounterVec::new(
            Opts::new(
                "pubflow_http_conflicts_total",
                "HTTP 409 responses from rejected or racing transitions",
            ),
            &["method", "path"],
        )?;
        let artifacts_total = GaugeVec::new(
            Opts::new("pubflow_artifacts_total", "Undeleted artifacts by lifecycle state"),
            &["state"],
        )?;
        let effects_total = GaugeVec::new(
            Opts::new("pubflow_effects_total", "Post-commit effects by delivery outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(http_errors_total.clone()))?;
        registry.register(Box::new(http_conflicts_total.clone()))?;
        registry.register(Box::new(artifacts_total.clone()))?;
        registry.register(Box::new(effects_total.clone()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                http_requests_total,
                http_request_duration_seconds,
                http_errors_total,
                http_conflicts_total,
                artifacts_total,
                effects_total,
            }),
        })
    }

    /// Total request count across all labels.
    pub fn requests(&self) -> u64 {
        sum_counters(&self.inner.http_requests_total)
    }

    /// Total 4xx and 5xx responses across all labels.
    pub fn errors(&self) -> u64 {
        sum_counters(&self.inner.http_errors_total)
    }

    /// Total 409 responses across all labels.
    pub fn conflicts(&self) -> u64 {
        sum_counters(&self.inner.http_conflicts_total)
    }

    fn record_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.inner
            .http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.inner
            .http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);

        if status >= 400 {
            self.inner
                .http_errors_total
                .with_label_values(&[method, path, &status_str])
                .inc();
        }
        if status == 409 {
            self.inner
                .http_conflicts_total
                .with_label_values(&[method, path])
                .inc();
        }
    }

    /// Replace the artifacts-by-state gauge with `counts`.
    pub fn set_artifact_counts<'a>(&self, counts: impl IntoIterator<Item = (&'a str, usize)>) {
        self.inner.artifacts_total.reset();
        for (state, count) in counts {
            self.inner
                .artifacts_total
                .with_label_values(&[state])
                .set(count as f64);
        }
    }

    /// Mirror the notifier's delivery counters.
    pub fn set_delivery(&self, report: &DeliveryReport) {
        let gauge = &self.inner.effects_total;
        gauge.with_label_values(&["enqueued"]).set(report.enqueued as f64);
        gauge.with_label_values(&["rejected"]).set(report.rejected as f64);
        gauge.with_label_values(&["delivered"]).set(report.delivered as f64);
        gauge.with_label_values(&["retried"]).set(report.retried as f64);
        gauge.with_label_values(&["failed"]).set(report.failed as f64);
        gauge
            .with_label_values(&["outstanding"])
            .set(report.outstanding() as f64);
    }

    /// Gather all metrics and encode to Prometheus text format.
    pub fn gather_and_encode(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| format!("failed to encode metrics: {e}"))?;
        String::from_utf8(buffer).map_err(|e| format!("metrics encoding produced invalid UTF-8: {e}"))
    }
}

fn sum_counters(counter: &IntCounterVec) -> u64 {
    counter
        .collect()
        .iter()
        .flat_map(|family| family.get_metric())
        .map(|m| m.get_counter().get_value() as u64)
        .sum()
}

/// Replace UUID segments with `{id}` to keep label cardinality bounded.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if uuid::Uuid::try_parse(segment).is_ok() {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Middleware that records HTTP request metrics.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let metrics = request.extensions().get::<ApiMetrics>().cloned();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());
    let start = Instant::now();

    let response = next.run(request).await;

    if let Some(m) = metrics {
        let duration = start.elapsed().as_secs_f64();
        m.record_request(&method, &path, response.status().as_u16(), duration);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> ApiMetrics {
        ApiMetrics::new().unwrap()
    }

    #[test]
    fn counters_start_at_zero() {
        let m = metrics();
        assert_eq!(m.requests(), 0);
        assert_eq!(m.errors(), 0);
        assert_eq!(m.conflicts(), 0);
    }

    #[test]
    fn record_sorts_by_status() {
        let m = metrics();
        m.record_request("GET", "/v1/artifacts", 200, 0.01);
        m.record_request("POST", "/v1/artifacts/{id}/make-public", 409, 0.01);
        m.record_request("POST", "/v1/artifacts/{id}/make-public", 403, 0.01);
        m.record_request("GET", "/v1/artifacts", 500, 0.2);

        assert_eq!(m.requests(), 4);
        assert_eq!(m.errors(), 3);
        assert_eq!(m.conflicts(), 1);
    }

    #[test]
    fn clones_share_the_registry() {
        let m = metrics();
        let clone = m.clone();
        clone.record_request("POST", "/v1/artifacts", 201, 0.01);
        assert_eq!(m.requests(), 1);
    }

    #[test]
    fn gauges_appear_in_text_exposition() {
        let m = metrics();
        m.set_artifact_counts([("PUBLIC", 2), ("DRAFT", 1)]);
        m.set_delivery(&DeliveryReport {
            enqueued: 5,
            delivered: 3,
            failed: 1,
            ..DeliveryReport::default()
        });

        let output = m.gather_and_encode().unwrap();
        assert!(output.contains(r#"pubflow_artifacts_total{state="PUBLIC"} 2"#));
        assert!(output.contains(r#"pubflow_effects_total{outcome="outstanding"} 1"#));
    }

    #[test]
    fn artifact_gauge_drops_vanished_states() {
        let m = metrics();
        m.set_artifact_counts([("DRAFT", 1)]);
        m.set_artifact_counts([("PUBLIC", 1)]);
        let output = m.gather_and_encode().unwrap();
        assert!(!output.contains(r#"state="DRAFT""#));
    }

    #[test]
    fn normalize_path_replaces_ids() {
        assert_eq!(
            normalize_path("/v1/artifacts/550e8400-e29b-41d4-a716-446655440000/make-public"),
            "/v1/artifacts/{id}/make-public"
        );
        assert_eq!(normalize_path("/v1/artifacts"), "/v1/artifacts");
    }
}
