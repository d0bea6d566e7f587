//! # Metrics
//!
//! In-process request counters, totals and per route, rendered together
//! with the engine's counters in Prometheus text exposition format at
//! `GET /metrics`.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use credmate_monitor::EngineMetricsSnapshot;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteCounters {
    pub requests: u64,
    pub errors: u64,
}

/// Shared metrics state.
#[derive(Debug, Clone)]
pub struct ApiMetrics {
    pub request_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
    routes: Arc<Mutex<BTreeMap<(String, String), RouteCounters>>>,
}

impl ApiMetrics {
    pub fn new() -> Self {
        Self {
            request_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            routes: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn requests(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Counters for one `(method, route)` pair.
    pub fn route(&self, method: &str, route: &str) -> RouteCounters {
        self.routes
            .lock()
            .get(&(method.to_string(), route.to_string()))
            .copied()
            .unwrap_or_default()
    }

    fn record(&self, method: &str, route: &str, error: bool) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        if error {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        let mut routes = self.routes.lock();
        let counters = routes
            .entry((method.to_string(), route.to_string()))
            .or_default();
        counters.requests += 1;
        if error {
            counters.errors += 1;
        }
    }

    /// Prometheus text exposition of the request and engine counters.
    pub fn render(&self, engine: &EngineMetricsSnapshot) -> String {
        let mut out = String::new();
        counter(&mut out, "credmate_http_requests_total", "HTTP requests handled.", self.requests());
        counter(
            &mut out,
            "credmate_http_errors_total",
            "HTTP responses with a 4xx or 5xx status.",
            self.errors(),
        );

        let routes = self.routes.lock().clone();
        let _ = writeln!(out, "# HELP credmate_http_route_requests_total HTTP requests per route.");
        let _ = writeln!(out, "# TYPE credmate_http_route_requests_total counter");
        for ((method, route), c) in &routes {
            let _ = writeln!(
                out,
                "credmate_http_route_requests_total{{method=\"{method}\",route=\"{route}\"}} {}",
                c.requests
            );
        }
        let _ = writeln!(out, "# HELP credmate_http_route_errors_total HTTP error responses per route.");
        let _ = writeln!(out, "# TYPE credmate_http_route_errors_total counter");
        for ((method, route), c) in &routes {
            let _ = writeln!(
                out,
                "credmate_http_route_errors_total{{method=\"{method}\",route=\"{route}\"}} {}",
                c.errors
            );
        }

        counter(&mut out, "credmate_evaluations_total", "Compliance evaluations run.", engine.evaluations);
        counter(
            &mut out,
            "credmate_degraded_evaluations_total",
            "Evaluations that produced a degraded snapshot.",
            engine.degraded_evaluations,
        );
        counter(
            &mut out,
            "credmate_evaluation_failures_total",
            "Evaluations that failed outright.",
            engine.evaluation_failures,
        );
        counter(
            &mut out,
            "credmate_sweep_failures_total",
            "Licenses a sweep gave up on.",
            engine.sweep_failures,
        );
        counter(
            &mut out,
            "credmate_snapshots_recorded_total",
            "Snapshots appended to history.",
            engine.snapshots_recorded,
        );
        counter(
            &mut out,
            "credmate_notifications_total",
            "Notification intents queued.",
            engine.notifications,
        );
        out
    }
}

fn counter(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} counter");
    let _ = writeln!(out, "{name} {value}");
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Middleware that increments request and error counters.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let metrics = request.extensions().get::<ApiMetrics>().cloned();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    if let Some(m) = metrics {
        let status = response.status();
        m.record(&method, &route, status.is_client_error() || status.is_server_error());
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app(metrics: ApiMetrics) -> Router {
        Router::new()
            .route("/ok/:id", get(|| async { "ok" }))
            .route("/fail", get(|| async { StatusCode::CONFLICT }))
            .layer(from_fn(metrics_middleware))
            .layer(axum::Extension(metrics))
    }

    async fn hit(app: Router, uri: &str) {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn counts_requests_and_errors() {
        let metrics = ApiMetrics::new();
        hit(app(metrics.clone()), "/ok/1").await;
        hit(app(metrics.clone()), "/ok/2").await;
        hit(app(metrics.clone()), "/fail").await;
        assert_eq!(metrics.requests(), 3);
        assert_eq!(metrics.errors(), 1);
        assert_eq!(metrics.route("GET", "/fail").errors, 1);
    }

    #[tokio::test]
    async fn routes_are_counted_by_template() {
        let metrics = ApiMetrics::new();
        hit(app(metrics.clone()), "/ok/1").await;
        hit(app(metrics.clone()), "/ok/2").await;
        assert_eq!(metrics.route("GET", "/ok/:id").requests, 2);
    }

    #[test]
    fn render_includes_engine_counters() {
        let metrics = ApiMetrics::new();
        metrics.record("POST", "/v1/activities", false);
        let engine = EngineMetricsSnapshot {
            evaluations: 7,
            degraded_evaluations: 1,
            evaluation_failures: 0,
            sweep_failures: 2,
            snapshots_recorded: 5,
            notifications: 3,
        };
        let text = metrics.render(&engine);
        assert!(text.contains("credmate_http_requests_total 1"));
        assert!(text.contains(
            "credmate_http_route_requests_total{method=\"POST\",route=\"/v1/activities\"} 1"
        ));
        assert!(text.contains("credmate_evaluations_total 7"));
        assert!(text.contains("credmate_sweep_failures_total 2"));
        assert!(text.contains("# TYPE credmate_notifications_total counter"));
    }
}
