//! SyncApp Server
//!
//! Keeps a shared, versioned record set consistent across devices that
//! connect and disconnect at will.
//!
//! # Modules
//!
//! - `records`: versioned record store with optimistic concurrency
//! - `devices`: connected device registry and broadcast hub
//! - `sync`: WebSocket protocol, offline queue replay, per-connection sessions
//! - `routes`: REST CRUD, WebSocket upgrade, health endpoints

pub mod config;
pub mod db;
pub mod devices;
pub mod error;
pub mod records;
pub mod routes;
pub mod state;
pub mod sync;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health::router())
        .nest("/api/data", routes::records::router())
        .nest("/ws", routes::ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
