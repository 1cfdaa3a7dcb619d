//! Health check and server info endpoints

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub connected_devices: usize,
    pub server_time: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerInfo {
    pub host: String,
    pub port: u16,
    pub service_name: String,
    pub version: String,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        connected_devices: state.hub().device_count().await,
        server_time: Utc::now(),
    })
}

pub async fn server_info(State(state): State<AppState>) -> Json<ServerInfo> {
    let server = &state.config().server;
    Json(ServerInfo {
        host: server.host.clone(),
        port: server.port,
        service_name: server.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/server-info", get(server_info))
}
