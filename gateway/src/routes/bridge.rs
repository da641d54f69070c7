//! Bridge WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::bridge::bridge_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the bridge WebSocket router
///
/// # Endpoint
///
/// `GET /bridge` - WebSocket upgrade for browser audio bridging
///
/// # Example
///
/// ```json
/// // Client sends config
/// {"type": "config", "codec": "opus", "sample_rate": 48000, "channels": 1, "voice": "alloy"}
///
/// // Server responds
/// {"type": "session_started", "session_id": "...", "codec": "opus", "sample_rate": 48000, "channels": 1}
///
/// // Client streams Opus packets as binary frames
/// // Server streams Opus packets back, plus transcript messages
/// ```
pub fn create_bridge_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bridge", get(bridge_handler))
        .layer(TraceLayer::new_for_http())
}
