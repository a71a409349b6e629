//! Per-request tracing for the coordinator and node routers
//!
//! Each request runs inside an `http_request` span carrying a request id, taken
//! from `X-Request-ID` when the caller sent one, and echoed back in the
//! response so clients can quote it when reading the logs.

use crate::common::metrics::METRICS;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderValue, Request, Response},
    middleware::Next,
};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

fn request_id(request: &Request<Body>) -> String {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(generate_request_id)
}

/// Must be installed with `route_layer` so the matched route is available.
pub async fn request_tracing_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let start = Instant::now();
    let request_id = request_id(&request);
    let method = request.method().clone();
    // Metric labels use the route template, never the raw key
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %method,
        route = %route,
    );

    let mut response = next.run(request).instrument(span.clone()).await;

    let elapsed = start.elapsed();
    let status = response.status();
    METRICS.record_request(&route, elapsed, !status.is_server_error());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    span.in_scope(|| {
        let ms = elapsed.as_millis() as u64;
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), elapsed_ms = ms, "Request failed");
        } else {
            // 404s are routine: replicas answer them on every miss
            tracing::debug!(status = status.as_u16(), elapsed_ms = ms, "Request completed");
        }
    });

    response
}
