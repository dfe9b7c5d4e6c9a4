//! # pubflow-api — Axum API Service
//!
//! HTTP surface over the publication lifecycle controller. Handlers parse
//! the request, call one controller operation, write the committed
//! snapshot through to Postgres when configured, and map errors to
//! structured JSON.
//!
//! ## API Surface
//!
//! | Prefix | Module | Domain |
//! |---|---|---|
//! | `/v1/artifacts`, `/v1/artifacts/:id` | [`routes::artifacts`] | Records, metadata, contributors |
//! | `/v1/artifacts/:id/versions` | [`routes::artifacts`] | Version chains |
//! | `/v1/artifacts/:id/<operation>` | [`routes::transitions`] | Lifecycle transitions |
//! | `/v1/artifacts/:id/withdrawal-requests`, `/v1/withdrawal-requests/*` | [`routes::withdrawals`] | Withdrawal |
//! | `/openapi.json` | [`openapi`] | Generated OpenAPI document |
//! | `/health/*` | this module | Liveness and readiness |
//! | `/metrics` | this module | Prometheus text exposition |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → Handler
//! ```
//!
//! The acting identity comes from the `X-Actor-Id` header. Authentication
//! happens upstream. Elapsed embargoes are lifted by the [`sweeper`] task
//! the binary starts next to the server.

pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod sweeper;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};

use crate::middleware::metrics::ApiMetrics;
use crate::state::AppState;

pub use error::AppError;

/// Assemble the full application router with all routes and middleware.
///
/// Fails only if the metrics registry rejects a collector.
pub fn app(state: AppState) -> Result<Router, prometheus::Error> {
    let metrics = ApiMetrics::new()?;

    let api = Router::new()
        .merge(routes::router())
        .merge(openapi::router())
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(Extension(metrics.clone()));

    let ops = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .layer(Extension(metrics));

    Ok(Router::new()
        .merge(ops)
        .merge(api)
        .layer(middleware::tracing_layer::layer())
        .with_state(state))
}

/// GET /health/liveness — always 200 while the process runs.
async fn liveness() -> &'static str {
    "ok"
}

/// GET /health/readiness
///
/// Fails with 503 when the database is configured but unreachable, or the
/// notifier has stopped accepting effects.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!("Database health check failed: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
        }
    }

    if let Some(notifier) = &state.notifier {
        if notifier.is_closed() {
            return (StatusCode::SERVICE_UNAVAILABLE, "notifier stopped").into_response();
        }
    }

    (StatusCode::OK, "ready").into_response()
}

/// GET /metrics — Prometheus scrape endpoint.
///
/// Refreshes the lifecycle gauges from the controller and the notifier,
/// then encodes every metric in text exposition format.
async fn prometheus_metrics(
    State(state): State<AppState>,
    Extension(metrics): Extension<ApiMetrics>,
) -> impl IntoResponse {
    metrics.set_artifact_counts(state.controller.state_counts());
    if let Some(notifier) = &state.notifier {
        metrics.set_delivery(&notifier.report());
    }

    match metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode Prometheus metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e).into_response()
        }
    }
}
