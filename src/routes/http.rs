// GET handlers: version, snapshot, threats, connections

use axum::{extract::State, response::IntoResponse};

use super::AppState;
use crate::version::{NAME, VERSION};

/// GET /version: service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/snapshot: full current snapshot, the same shape WebSocket clients receive.
pub(super) async fn snapshot_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.feed.current_snapshot())
}

/// GET /api/threats: retained threat log, oldest first.
pub(super) async fn threats_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.feed.current_snapshot();
    axum::Json(serde_json::json!({
        "state": snapshot.state,
        "threats": snapshot.threats,
    }))
}

/// GET /api/connections: tracked connections, including ones inside their close grace period.
pub(super) async fn connections_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.feed.current_snapshot();
    axum::Json(serde_json::json!({
        "state": snapshot.state,
        "connections": snapshot.connections,
    }))
}
