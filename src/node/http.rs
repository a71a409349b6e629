//! HTTP API for a storage node
//!
//! - `POST /set`: append one version (`{key, value, vectorClock, createdAt?}`)
//! - `GET /get/:key`: JSON array of every version, 404 when none
//! - `DELETE /delete/:key`
//! - `GET /keys`, `GET /health`
//!
//! The same node doubles as the coordinator's cache.

use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::{validate_key, Error, Store, WriteRequest};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

#[derive(Clone)]
pub struct NodeState {
    pub store: Arc<dyn Store>,
    pub node_id: String,
}

/// Append a replica version. Re-sending an identical version is a no-op.
async fn set_version(
    State(state): State<NodeState>,
    Json(req): Json<WriteRequest>,
) -> Result<impl IntoResponse, Error> {
    validate_key(&req.key)?;
    let key = req.key.clone();
    let version = req.into_version();

    if state.store.append_if_absent(&key, version)? {
        tracing::debug!(node = %state.node_id, key = %key, "Version stored");
    } else {
        tracing::debug!(node = %state.node_id, key = %key, "Duplicate version ignored");
    }

    Ok((StatusCode::OK, Json(json!({ "message": "stored successfully" }))))
}

async fn get_versions(
    State(state): State<NodeState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let versions = state.store.get_all_versions(&key)?;
    Ok(Json(versions))
}

async fn delete_versions(
    State(state): State<NodeState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, Error> {
    state.store.delete_all_versions(&key)?;
    Ok(Json(json!({ "message": "deleted successfully" })))
}

async fn list_keys(State(state): State<NodeState>) -> Result<impl IntoResponse, Error> {
    let keys = state.store.get_all_keys()?;
    Ok(Json(json!({ "keys": keys })))
}

async fn health(State(state): State<NodeState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "node": state.node_id,
        "version": crate::VERSION,
    }))
}

pub fn create_router(state: NodeState) -> Router {
    Router::new()
        .route("/set", post(set_version).put(set_version))
        .route("/get/:key", get(get_versions))
        .route("/delete/:key", delete(delete_versions))
        .route("/keys", get(list_keys))
        .route("/health", get(health))
        .route_layer(middleware::from_fn(request_tracing_middleware))
        .with_state(state)
}
