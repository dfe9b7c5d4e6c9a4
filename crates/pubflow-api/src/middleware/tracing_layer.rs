//! # Request/Response Tracing
//!
//! Configures `tower_http::trace::TraceLayer` so every request span also
//! names the acting identity.

use axum::body::Body;
use axum::http::Request;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::extractors::ACTOR_HEADER;

type MakeSpan = fn(&Request<Body>) -> Span;

/// Build the `TraceLayer` for the pubflow API.
///
/// Each request gets a span with method, URI, and the `X-Actor-Id` value
/// (`-` when absent). Status and latency are recorded on response.
pub fn layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, MakeSpan> {
    TraceLayer::new_for_http().make_span_with(request_span as MakeSpan)
}

fn request_span(request: &Request<Body>) -> Span {
    let actor = request
        .headers()
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        actor = %actor,
    )
}
