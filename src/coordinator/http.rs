//! HTTP API for the coordinator
//!
//! - `PUT /set`: write a new version (`{key, value, vectorClock?}`)
//! - `GET /get/:key`: every known version of a key
//! - `DELETE /delete/:key`: drop local versions of a key
//! - `GET /preference-list?key=`: placement for a key
//! - `GET /cluster`, `GET /health`, `GET /metrics`
//!
//! An `X-Timeout-Ms` request header sets an external deadline for the quorum step.

use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::{Error, VectorClock, METRICS};
use crate::coordinator::quorum::RequestOptions;
use crate::coordinator::service::CoordinationService;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Header carrying the caller's timeout in milliseconds
pub const TIMEOUT_HEADER: &str = "X-Timeout-Ms";

#[derive(Clone)]
pub struct CoordState {
    pub service: Arc<CoordinationService>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.to_http_status();
        let body = match &self {
            Error::Quorum(q) => json!({
                "error": self.to_string(),
                "failedNodes": q.failed_nodes(),
            }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

fn request_options(headers: &HeaderMap) -> RequestOptions {
    headers
        .get(TIMEOUT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|ms| RequestOptions::with_timeout(Duration::from_millis(ms)))
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetRequest {
    #[serde(default)]
    key: String,
    #[serde(default)]
    value: String,
    vector_clock: Option<VectorClock>,
}

async fn set_key(
    State(state): State<CoordState>,
    headers: HeaderMap,
    Json(req): Json<SetRequest>,
) -> Result<impl IntoResponse, Error> {
    let opts = request_options(&headers);
    let clock = state
        .service
        .put_with(&req.key, &req.value, req.vector_clock, &opts)
        .await?;
    Ok(Json(json!({
        "message": "stored successfully",
        "vectorClock": clock,
    })))
}

async fn get_key(
    State(state): State<CoordState>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let opts = request_options(&headers);
    let versions = state.service.get_with(&key, &opts).await?;
    Ok(Json(json!({ "key": key, "versions": versions })))
}

async fn delete_key(
    State(state): State<CoordState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, Error> {
    state.service.delete(&key).await?;
    Ok(Json(json!({ "message": "deleted successfully" })))
}

#[derive(Debug, Deserialize)]
struct KeyQuery {
    #[serde(default)]
    key: String,
}

async fn preference_list(
    State(state): State<CoordState>,
    Query(query): Query<KeyQuery>,
) -> Result<impl IntoResponse, Error> {
    let list = state.service.preference_list(&query.key)?;
    let coordinator = state.service.placement().coordinator(&query.key)?;
    Ok(Json(json!({
        "key": query.key,
        "coordinator": coordinator.owner,
        "virtualNode": coordinator.label,
        "preferenceList": list,
    })))
}

async fn cluster_info(State(state): State<CoordState>) -> impl IntoResponse {
    let ring = state.service.placement().snapshot();
    let quorum = state.service.quorum_config();
    Json(json!({
        "nodes": ring.nodes(),
        "virtualNodes": ring.virtual_node_count(),
        "quorum": quorum,
        "consistency": quorum.consistency_level(),
        "sloppyQuorum": quorum.is_sloppy(),
    }))
}

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "version": crate::VERSION })),
    )
}

async fn metrics() -> impl IntoResponse {
    METRICS.to_prometheus()
}

pub fn create_router(state: CoordState) -> Router {
    Router::new()
        .route("/set", put(set_key).post(set_key))
        .route("/get/:key", get(get_key))
        .route("/delete/:key", delete(delete_key))
        .route("/preference-list", get(preference_list))
        .route("/cluster", get(cluster_info))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route_layer(middleware::from_fn(request_tracing_middleware))
        .with_state(state)
}
