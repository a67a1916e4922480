use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::delay::Deadline;
use crate::metrics::{HttpMetrics, RequestMetricLabels};

/// Instrumentation stage: times the whole request, simulated delay included,
/// and records exactly one counter and one histogram observation for it.
pub async fn track_metrics(
    State(metrics): State<Arc<HttpMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    // Label by the registered pattern, never the literal URL
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_default();

    let response = next.run(request).await;

    let status = response.status();
    let status_text = status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_str().to_string());
    metrics.record(
        RequestMetricLabels {
            status_text,
            method,
            route,
        },
        start.elapsed(),
    );
    response
}

/// Deadline stage: attaches a [`Deadline`] to the request for downstream
/// handlers to observe.
pub async fn attach_deadline(
    State(timeout): State<Duration>,
    mut request: Request,
    next: Next,
) -> Response {
    let deadline = Deadline::after(timeout);
    let uri = request.uri().clone();
    request.extensions_mut().insert(deadline);

    let response = next.run(request).await;

    if deadline.is_expired() {
        warn!("⏰ Request {} outlived its {:?} deadline (status {})", uri, timeout, response.status());
    }
    response
}
