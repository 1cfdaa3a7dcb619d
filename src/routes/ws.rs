//! WebSocket endpoint
//!
//! Each upgraded connection becomes one `SyncSession`.

use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    response::Response,
    routing::get,
    Router,
};

use crate::devices::DeviceHandle;
use crate::state::AppState;
use crate::sync::SyncSession;

/// Create the WebSocket router
pub fn router() -> Router<AppState> {
    Router::new().route("/:device_id", get(upgrade))
}

async fn upgrade(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (handle, outbound) = DeviceHandle::channel(state.config().sync.channel_capacity);
        let session = SyncSession::new(
            device_id,
            handle,
            state.store().clone(),
            state.hub().clone(),
        );
        session.run(socket, outbound).await;
    })
}
