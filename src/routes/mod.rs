// HTTP + WebSocket routes over the dashboard feed

mod http;
mod ws;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::feed::DashboardFeed;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) feed: Arc<DashboardFeed>,
}

pub fn app(feed: Arc<DashboardFeed>) -> Router {
    let state = AppState { feed };
    Router::new()
        .route("/", get(|| async { "netsentry: network telemetry feed" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/snapshot", get(http::snapshot_handler)) // GET /api/snapshot
        .route("/api/threats", get(http::threats_handler)) // GET /api/threats
        .route("/api/connections", get(http::connections_handler)) // GET /api/connections
        .route("/ws/feed", get(ws::ws_feed)) // WS /ws/feed
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
